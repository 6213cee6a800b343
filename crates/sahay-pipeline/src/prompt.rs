//! Prompt assembly.
//!
//! Builds the generation prompt from three blocks in fixed order: system
//! instructions, knowledge base excerpts, and the conversation so far.
//! Empty blocks are omitted entirely.

/// A document excerpt included in the prompt.
#[derive(Debug, Clone)]
pub struct DocExcerpt {
    pub title: String,
    pub content: String,
}

/// Renders the fixed prompt template.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_instructions: String,
}

impl PromptBuilder {
    pub fn new(system_instructions: impl Into<String>) -> Self {
        Self {
            system_instructions: system_instructions.into(),
        }
    }

    /// Assemble the full prompt for one turn.
    pub fn build(&self, context: &str, excerpts: &[DocExcerpt], user_text: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.system_instructions);

        if !excerpts.is_empty() {
            prompt.push_str("\n\nKnowledge base excerpts:");
            for (i, excerpt) in excerpts.iter().enumerate() {
                prompt.push_str(&format!(
                    "\n[{}] {}\n{}",
                    i + 1,
                    excerpt.title,
                    excerpt.content
                ));
            }
        }

        if !context.is_empty() {
            prompt.push_str("\n\nConversation so far:\n");
            prompt.push_str(context);
        }

        prompt.push_str(&format!("\n\nUser: {}\nAssistant:", user_text));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PromptBuilder {
        PromptBuilder::new("You are a kiosk assistant.")
    }

    #[test]
    fn test_minimal_prompt() {
        let prompt = builder().build("", &[], "hello");
        assert_eq!(
            prompt,
            "You are a kiosk assistant.\n\nUser: hello\nAssistant:"
        );
    }

    #[test]
    fn test_excerpts_are_numbered() {
        let excerpts = vec![
            DocExcerpt {
                title: "Hours".to_string(),
                content: "Open 9 to 5.".to_string(),
            },
            DocExcerpt {
                title: "Location".to_string(),
                content: "Ground floor.".to_string(),
            },
        ];
        let prompt = builder().build("", &excerpts, "when are you open");

        assert!(prompt.contains("Knowledge base excerpts:"));
        assert!(prompt.contains("[1] Hours\nOpen 9 to 5."));
        assert!(prompt.contains("[2] Location\nGround floor."));
    }

    #[test]
    fn test_context_block_included() {
        let prompt = builder().build("User: hi\nAssistant: hello", &[], "thanks");
        assert!(prompt.contains("Conversation so far:\nUser: hi\nAssistant: hello"));
    }

    #[test]
    fn test_block_order() {
        let excerpts = vec![DocExcerpt {
            title: "T".to_string(),
            content: "C".to_string(),
        }];
        let prompt = builder().build("User: a\nAssistant: b", &excerpts, "next");

        let system_pos = prompt.find("You are a kiosk assistant.").unwrap();
        let excerpt_pos = prompt.find("Knowledge base excerpts:").unwrap();
        let context_pos = prompt.find("Conversation so far:").unwrap();
        let user_pos = prompt.rfind("User: next").unwrap();
        assert!(system_pos < excerpt_pos);
        assert!(excerpt_pos < context_pos);
        assert!(context_pos < user_pos);
    }

    #[test]
    fn test_ends_with_assistant_cue() {
        let prompt = builder().build("", &[], "anything");
        assert!(prompt.ends_with("Assistant:"));
    }
}
