use razor::{ErrorKind, RazorError};

use crate::error::RuntimeError;
use crate::evaluator::Host;
use crate::executor::{Collaborators, Page, Session, render};
use crate::runtime_value::RuntimeValue;

/// Partial views may include each other at most this deep.
pub const MAX_PARTIAL_DEPTH: usize = 32;

/// Escape text for use in markup and attribute values.
pub fn encode(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

/// The execution state of one template: its output, the section being
/// captured and the layout it asked for.
pub struct HtmlContext<'s, 'a> {
    file_path: String,
    model: RuntimeValue,
    body: Option<String>,
    output: String,
    active_section: Option<String>,
    layout: Option<String>,
    session: &'s mut Session,
    collaborators: Collaborators<'a>,
    depth: usize,
}

impl<'s, 'a> HtmlContext<'s, 'a> {
    pub(crate) fn new(
        file_path: &str,
        model: RuntimeValue,
        body: Option<String>,
        session: &'s mut Session,
        collaborators: Collaborators<'a>,
        depth: usize,
    ) -> Self {
        HtmlContext {
            file_path: file_path.to_string(),
            model,
            body,
            output: String::new(),
            active_section: None,
            layout: None,
            session,
            collaborators,
            depth,
        }
    }

    fn write(&mut self, text: &str) {
        match &self.active_section {
            Some(name) => self.session.sections.append(name, text),
            None => self.output.push_str(text),
        }
    }

    /// Finish execution and hand back what the template produced.
    pub(crate) fn finish(self) -> Result<Page, RazorError> {
        if let Some(name) = self.active_section {
            return Err(RazorError::new(
                ErrorKind::Internal {
                    message: format!("section '{}' was never closed", name),
                },
                self.file_path,
            ));
        }
        Ok(Page {
            html: self.output,
            layout: self.layout,
        })
    }
}

impl Host for HtmlContext<'_, '_> {
    fn model(&self) -> &RuntimeValue {
        &self.model
    }

    fn write_raw(&mut self, text: &str) {
        self.write(text);
    }

    fn write_encoded(&mut self, value: &RuntimeValue) {
        match value {
            RuntimeValue::Undefined | RuntimeValue::Null => {}
            RuntimeValue::String(s) if s.is_empty() => {}
            RuntimeValue::Number(_) | RuntimeValue::Boolean(_) => self.write(&value.to_string()),
            RuntimeValue::Html(html) => self.write(html),
            RuntimeValue::String(s) => self.write(&encode(s)),
            other => self.write(&encode(&other.to_string())),
        }
    }

    fn section_marker(&mut self, name: &str) -> Result<(), RuntimeError> {
        match self.active_section.as_deref() {
            None => {
                log::trace!("capturing section '{}'", name);
                self.session.sections.open(name);
                self.active_section = Some(name.to_string());
                Ok(())
            }
            Some(active) if active == name => {
                self.active_section = None;
                Ok(())
            }
            Some(active) => Err(RazorError::new(
                ErrorKind::UnexpectedSectionName {
                    name: name.to_string(),
                    active: active.to_string(),
                },
                self.file_path.as_str(),
            )
            .into()),
        }
    }

    fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    fn read_section(&mut self, name: &str, required: bool) -> Result<RuntimeValue, RuntimeError> {
        let section = self
            .session
            .sections
            .take(name, required, &self.file_path)
            .map_err(|kind| RazorError::new(kind, self.file_path.as_str()))?;
        Ok(match section {
            Some(html) => RuntimeValue::Html(html),
            None => RuntimeValue::String(String::new()),
        })
    }

    fn partial(&mut self, name: &str, model: Option<RuntimeValue>) -> Result<(), RuntimeError> {
        if self.depth >= MAX_PARTIAL_DEPTH {
            return Err(RazorError::new(
                ErrorKind::TemplateNestingTooDeep {
                    depth: MAX_PARTIAL_DEPTH,
                },
                self.file_path.as_str(),
            )
            .into());
        }

        let resolved = self
            .collaborators
            .resolver
            .find_partial_sync(name, &self.file_path)?;
        log::debug!("including partial '{}' from {}", resolved.file_path, self.file_path);

        let model = model.unwrap_or_else(|| self.model.clone());
        let page = render(
            &resolved.data,
            &resolved.file_path,
            model,
            None,
            self.session,
            self.collaborators,
            self.depth + 1,
        )?;
        if page.layout.is_some() {
            log::warn!(
                "layout set by partial '{}' is ignored",
                resolved.file_path
            );
        }
        self.write(&page.html);
        Ok(())
    }

    fn layout(&self) -> Option<&str> {
        self.layout.as_deref()
    }

    fn set_layout(&mut self, layout: Option<String>) {
        self.layout = layout;
    }
}
