use std::path::Path;

use crate::error::{Error, Result};

const CONTEXT: &str = "{context_str}";
const QUERY: &str = "{query_str}";

pub const DEFAULT_QA_TEMPLATE: &str = "Context information is below.\n\
---------------------\n\
{context_str}\n\
---------------------\n\
Given the context information above, I want you to think step by step to answer the query in a crisp manner. If you don't know the answer, say 'I don't know!'.\n\
Query: {query_str}\n\
Answer: ";

/// Answer-synthesis prompt with `{context_str}` and `{query_str}` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_QA_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for slot in [CONTEXT, QUERY] {
            if !template.contains(slot) {
                return Err(Error::Configuration(format!(
                    "prompt template is missing the {slot} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let template = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "could not read prompt template {}: {e}",
                path.display()
            ))
        })?;
        Self::new(template)
    }

    /// Fills both slots in a single pass over the template, so slot-like
    /// text inside the context or query is left as is.
    pub fn format(&self, context: &str, query: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + query.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(CONTEXT) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUERY) {
                out.push_str(query);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}
