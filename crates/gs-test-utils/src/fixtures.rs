//! Request fixtures.

use serde_json::{json, Value};

/// Builder for `join` requests.
#[derive(Debug, Clone)]
pub struct JoinRequestBuilder {
    id: Option<Value>,
    game: String,
    nick: String,
    team: Option<String>,
}

impl JoinRequestBuilder {
    /// A `join` for `game` as `nick`, without `id` or `team`.
    #[must_use]
    pub fn new(game: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            id: None,
            game: game.into(),
            nick: nick.into(),
            team: None,
        }
    }

    /// Set the correlation id echoed in the `join-result`.
    #[must_use]
    pub fn id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Request a team: `first`, `second` or `random`.
    #[must_use]
    pub fn team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    /// Build the JSON request.
    #[must_use]
    pub fn build(&self) -> Value {
        let mut request = json!({
            "type": "join",
            "game": self.game,
            "nick": self.nick,
        });
        if let Some(object) = request.as_object_mut() {
            if let Some(id) = &self.id {
                object.insert("id".to_string(), id.clone());
            }
            if let Some(team) = &self.team {
                object.insert("team".to_string(), Value::String(team.clone()));
            }
        }
        request
    }
}

/// A message type no server understands.
#[must_use]
pub fn unknown_message() -> Value {
    json!({ "type": "frobnicate" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_join() {
        let request = JoinRequestBuilder::new("g1", "alice").build();
        assert_eq!(
            request,
            json!({"type": "join", "game": "g1", "nick": "alice"})
        );
    }

    #[test]
    fn test_full_join() {
        let request = JoinRequestBuilder::new("g1", "bob")
            .id(3)
            .team("second")
            .build();
        assert_eq!(request["id"], 3);
        assert_eq!(request["team"], "second");
    }
}
