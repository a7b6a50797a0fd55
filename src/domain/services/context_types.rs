use std::collections::HashMap;

/// Maps context-ref type ids to the backend tools they unlock for a turn.
#[derive(Clone, Debug)]
pub struct ContextTypeRegistry {
    tools: HashMap<String, Vec<String>>,
}

impl Default for ContextTypeRegistry {
    fn default() -> ContextTypeRegistry {
        return ContextTypeRegistry::with_defaults();
    }
}

impl ContextTypeRegistry {
    pub fn empty() -> ContextTypeRegistry {
        return ContextTypeRegistry {
            tools: HashMap::new(),
        };
    }

    pub fn with_defaults() -> ContextTypeRegistry {
        let mut registry = ContextTypeRegistry::empty();
        registry.register("note", &["note_read", "note_search"]);
        registry.register("card", &["card_read", "anki_generate"]);
        registry.register("file", &["file_read", "document_search"]);
        registry.register("skill", &["skill_load"]);
        registry.register("exam", &["question_bank_search", "note_search"]);
        registry.register("image", &["image_describe"]);

        return registry;
    }

    pub fn register(&mut self, type_id: &str, tools: &[&str]) {
        self.tools.insert(
            type_id.to_string(),
            tools.iter().map(|tool| return tool.to_string()).collect(),
        );
    }

    pub fn tools_for(&self, type_id: &str) -> &[String] {
        return self
            .tools
            .get(type_id)
            .map(|tools| return tools.as_slice())
            .unwrap_or(&[]);
    }
}
