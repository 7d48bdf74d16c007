//! Board service: HTTP back-end for users, boards and their list/task trees.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │  (SPA)   │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘          │         │  identity.rs (CurrentUser extractor)   │
//!                       │         │                                        │
//!                       │         │ load board → mutate → save lists       │
//!                       │         v                                        │
//!                       │  taskboard_core::TreeMutator  (pure tree edits)  │
//!                       │         │                                        │
//!                       │         v                                        │
//!                       │  db.rs  (BoardDb, DocumentCodec on `lists`)      │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `models`   | `User`, `Board`, change sets                            |
//! | `db`       | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)     |
//! | `identity` | `Authenticator` trait, header-based default             |
//! | `api`      | Route handlers, `ApiError` → JSON `{"message"}`         |
//! | `server`   | Router assembly, CORS, graceful shutdown                |
//!
//! ## Typical Request Flow (add a task)
//!
//! 1. `POST /api/boards/{id}/lists/{list_id}/tasks` → `CurrentUser` resolves
//!    the caller through the configured `Authenticator`.
//! 2. The handler loads the caller's board; the store decodes `lists`,
//!    repairing a corrupt document to an empty sequence.
//! 3. `TreeMutator::append_task` edits the in-memory tree.
//! 4. A second store call re-encodes and writes the whole tree. Concurrent
//!    writers to one board are last-write-wins.

pub mod api;
pub mod db;
pub mod identity;
pub mod models;
pub mod server;
