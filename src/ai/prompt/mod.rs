//! Prompt Builder
//!
//! Standardized prompt construction shared by all step executors:
//! role, numbered objectives, context facts, grounding passages and focus rules.

/// Prompt section types
#[derive(Debug, Clone)]
pub enum PromptSection {
    /// Role definition with expertise area
    Role { expertise: String, task: String },
    /// Numbered objectives
    Objectives(Vec<String>),
    /// Ordered key-value facts
    Context(Vec<(String, String)>),
    /// Raw text section with optional header
    Text {
        header: Option<String>,
        content: String,
    },
    /// Numbered excerpts from the source document
    Passages(Vec<String>),
    /// Focus enforcement with restrictions
    Focus {
        target: String,
        restrictions: Vec<String>,
    },
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    pub fn objectives(mut self, objectives: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(String::from).collect(),
        ));
        self
    }

    /// Add a context fact. Facts are collected into a single section in insertion order.
    pub fn context_item(mut self, key: &str, value: &str) -> Self {
        let item = (key.to_string(), value.to_string());
        for section in &mut self.sections {
            if let PromptSection::Context(ctx) = section {
                ctx.push(item);
                return self;
            }
        }
        self.sections.push(PromptSection::Context(vec![item]));
        self
    }

    /// Add text section with header
    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: None,
            content: content.to_string(),
        });
        self
    }

    pub fn passages(mut self, passages: Vec<String>) -> Self {
        self.sections.push(PromptSection::Passages(passages));
        self
    }

    pub fn focus(mut self, target: &str, restrictions: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Focus {
            target: target.to_string(),
            restrictions: restrictions.into_iter().map(String::from).collect(),
        });
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&format!(
                        "You are an expert {} specializing in {}.\n",
                        expertise, task
                    ));
                    prompt.push_str("</ROLE>\n\n");
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("<OBJECTIVES>\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push_str("</OBJECTIVES>\n\n");
                }
                PromptSection::Context(ctx) => {
                    prompt.push_str("# Context\n\n");
                    for (key, value) in ctx {
                        prompt.push_str(&format!("**{}**: {}\n", key, value));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("# {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Passages(passages) => {
                    prompt.push_str("<DOCUMENT_EXCERPTS>\n");
                    if passages.is_empty() {
                        prompt.push_str("(no excerpts retrieved)\n");
                    }
                    for (i, passage) in passages.iter().enumerate() {
                        prompt.push_str(&format!("[{}] {}\n\n", i + 1, passage.trim()));
                    }
                    prompt.push_str("</DOCUMENT_EXCERPTS>\n\n");
                }
                PromptSection::Focus {
                    target,
                    restrictions,
                } => {
                    prompt.push_str("<FOCUS>\n");
                    prompt.push_str(&format!("IMPORTANT: Focus EXCLUSIVELY on: {}\n", target));
                    for restriction in restrictions {
                        prompt.push_str(&format!("- {}\n", restriction));
                    }
                    prompt.push_str("</FOCUS>\n\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}
