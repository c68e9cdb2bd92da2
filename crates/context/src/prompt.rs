//! Prompt template with `{context}` and `{question}` slots

use thiserror::Error;

/// Template used when no override is configured
pub const DEFAULT_TEMPLATE: &str = "
You are Cognexia. Answer based ONLY on the context below.
If the answer is not in the context, say \"I don't know.\"

Context:
{context}

Question:
{question}
";

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

#[derive(Error, Debug, PartialEq)]
pub enum PromptError {
    #[error("Prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
}

/// A validated prompt template
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Accept a template only if it has both placeholders
    pub fn new(template: impl Into<String>) -> Result<Self, PromptError> {
        let template = template.into();
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            if !template.contains(slot) {
                return Err(PromptError::MissingPlaceholder(slot));
            }
        }
        Ok(Self { template })
    }

    /// Fill both slots.
    ///
    /// Substitution is single pass, so braces inside the context or the
    /// question are never expanded.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        loop {
            let next = [(CONTEXT_SLOT, context), (QUESTION_SLOT, question)]
                .into_iter()
                .filter_map(|(slot, value)| rest.find(slot).map(|pos| (pos, slot, value)))
                .min_by_key(|(pos, _, _)| *pos);

            match next {
                Some((pos, slot, value)) => {
                    out.push_str(&rest[..pos]);
                    out.push_str(value);
                    rest = &rest[pos + slot.len()..];
                }
                None => {
                    out.push_str(rest);
                    return out;
                }
            }
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}
