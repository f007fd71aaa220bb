use std::collections::HashMap;

use razor::ErrorKind;

#[derive(Debug, Clone, Default)]
struct CapturedSection {
    html: String,
    /// The template that consumed the section, once it has been read.
    rendered_by: Option<String>,
}

/// Markup captured by `@section` blocks during one compile invocation.
#[derive(Debug, Clone, Default)]
pub struct CapturedSections {
    sections: HashMap<String, CapturedSection>,
}

impl CapturedSections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start capturing `name`. A section that is opened but never written
    /// still exists, with empty content.
    pub fn open(&mut self, name: &str) {
        self.sections.entry(name.to_string()).or_default();
    }

    pub fn append(&mut self, name: &str, text: &str) {
        self.sections
            .entry(name.to_string())
            .or_default()
            .html
            .push_str(text);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Consume `name` on behalf of `requested_by`.
    ///
    /// Returns `Ok(None)` when the section was never captured and is not
    /// `required`. A section can be consumed only once.
    pub fn take(
        &mut self,
        name: &str,
        required: bool,
        requested_by: &str,
    ) -> Result<Option<String>, ErrorKind> {
        let Some(section) = self.sections.get_mut(name) else {
            if required {
                return Err(ErrorKind::SectionIsNotFound {
                    name: name.to_string(),
                    requested_by: requested_by.to_string(),
                });
            }
            return Ok(None);
        };

        if let Some(rendered_by) = &section.rendered_by {
            return Err(ErrorKind::SectionHasBeenRendered {
                name: name.to_string(),
                rendered_by: rendered_by.clone(),
                requested_by: requested_by.to_string(),
            });
        }
        section.rendered_by = Some(requested_by.to_string());
        Ok(Some(section.html.clone()))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
