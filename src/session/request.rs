use super::Session;
use crate::model::{ChatRequest, Message, Turn};

impl Session {
    /// Turns sent for the next request: the system prompt (when set)
    /// followed by every message in insertion order.
    pub fn build_turns(&self) -> Vec<Turn> {
        let mut turns = Vec::with_capacity(self.history.len() + 1);
        if let Some(system) = &self.system_prompt {
            turns.push(Turn::system(system.clone()));
        }
        turns.extend(self.history.iter().map(Turn::from));
        turns
    }

    /// Request for `pending` on top of the current history.
    pub(super) fn build_request(&self, pending: &Message) -> ChatRequest {
        let mut turns = self.build_turns();
        turns.push(Turn::from(pending));
        ChatRequest {
            model: self.model.clone(),
            turns,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Message, MessageRole, Turn};
    use crate::session::create_session;

    #[test]
    fn system_prompt_comes_first() {
        let mut session = create_session("gemini-2.5-flash", Some("You are terse.".to_string()));
        session.append(MessageRole::User, "Hi");

        assert_eq!(
            session.build_turns(),
            vec![Turn::system("You are terse."), Turn::user("Hi")]
        );
    }

    #[test]
    fn no_system_turn_without_a_system_prompt() {
        let mut session = create_session("m", None);
        session.append(MessageRole::User, "Hi");
        session.append(MessageRole::Assistant, "Hello");

        let turns = session.build_turns();
        assert_eq!(turns.len(), 2);
        assert!(turns.iter().all(|turn| turn.role != MessageRole::System));
    }

    #[test]
    fn preserves_insertion_order_for_any_role_sequence() {
        let sequence = [
            (MessageRole::User, "one"),
            (MessageRole::User, "two"),
            (MessageRole::Assistant, "three"),
            (MessageRole::System, "four"),
            (MessageRole::Assistant, "five"),
        ];
        let mut session = create_session("m", Some("sys".to_string()));
        for (role, content) in sequence {
            session.append(role, content);
        }

        let turns = session.build_turns();
        assert_eq!(turns[0], Turn::system("sys"));
        let rest: Vec<(MessageRole, &str)> = turns[1..]
            .iter()
            .map(|turn| (turn.role, turn.content.as_str()))
            .collect();
        assert_eq!(rest, sequence.to_vec());
    }

    #[test]
    fn build_turns_is_pure() {
        let mut session = create_session("m", Some("sys".to_string()));
        session.append(MessageRole::User, "Hi");
        let first = session.build_turns();
        let second = session.build_turns();
        assert_eq!(first, second);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn request_carries_current_model_and_pending_message_last() {
        let mut session = create_session("first-model", None);
        session.append(MessageRole::User, "Hi");
        session.set_model("second-model");

        let request = session.build_request(&Message::user("next").with_attachment("doc"));
        assert_eq!(request.model, "second-model");
        let last = request.turns.last().expect("pending turn");
        assert_eq!(last.content, "next");
        assert_eq!(last.attachment.as_deref(), Some("doc"));
        assert_eq!(request.turns.len(), 2);
    }
}
