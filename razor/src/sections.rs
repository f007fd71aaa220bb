use std::collections::HashMap;

/// Section names declared during one compile invocation, mapped to the file
/// that declared them. Shared by a template, its partials and its layouts so
/// that a section name is unique across all of them.
#[derive(Debug, Clone, Default)]
pub struct ParsedSectionRegistry {
    sections: HashMap<String, String>,
}

impl ParsedSectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` as declared in `file_path`.
    /// Returns the path of the earlier declaration if the name is taken.
    pub fn declare(&mut self, name: &str, file_path: &str) -> Result<(), &str> {
        if self.sections.contains_key(name) {
            return Err(self.sections[name].as_str());
        }
        self.sections.insert(name.to_string(), file_path.to_string());
        Ok(())
    }

    pub fn declared_in(&self, name: &str) -> Option<&str> {
        self.sections.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
