use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskboard_core::List;

pub const DEFAULT_BOARDS_TITLE: &str = "My Boards";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub boards_title: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A board with its list tree already decoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub custom_title: Option<String>,
    pub position: i64,
    pub lists: Vec<List>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewBoard {
    pub name: String,
    pub description: Option<String>,
    pub custom_title: Option<String>,
    pub position: i64,
    /// Client-supplied tree, encoded through the codec before it is stored.
    pub lists: Option<Value>,
}

/// Column changes for a board update. `None` leaves a column untouched;
/// `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct BoardChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub custom_title: Option<Option<String>>,
    pub position: Option<i64>,
    pub lists: Option<Value>,
}

impl BoardChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.custom_title.is_none()
            && self.position.is_none()
            && self.lists.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub boards_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn board_serializes_camel_case() {
        let board = Board {
            id: 1,
            user_id: 2,
            name: "Work".into(),
            description: None,
            custom_title: Some("Sprint".into()),
            position: 0,
            lists: vec![List::new("l1", "Todo")],
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        };
        let value = serde_json::to_value(&board).unwrap();
        assert_eq!(value["userId"], 2);
        assert_eq!(value["customTitle"], "Sprint");
        assert_eq!(value["description"], Value::Null);
        assert_eq!(value["lists"][0]["id"], "l1");
        assert!(value.get("user_id").is_none());
    }

    #[test]
    fn user_serializes_boards_title() {
        let user = User {
            id: 1,
            name: "Test User".into(),
            email: "test@example.com".into(),
            boards_title: DEFAULT_BOARDS_TITLE.into(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(
            serde_json::to_value(&user).unwrap()["boardsTitle"],
            json!("My Boards")
        );
    }

    #[test]
    fn empty_changes_are_detected() {
        assert!(BoardChanges::default().is_empty());
        let changes = BoardChanges {
            description: Some(None),
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }
}
