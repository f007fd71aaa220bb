use super::{Parser, append, is_void_element, push_block};
use crate::block::{Block, BlockKind};
use crate::error::{ErrorKind, Position, RazorError};

/// An element whose closing tag has not been seen yet.
struct OpenTag {
    tag: String,
    name: String,
    position: Position,
}

/// Advance the `--` detector used to find the end of an HTML comment.
/// `dashes` holds the trailing dashes seen so far. Returns true at `-->`.
fn comment_step(dashes: &mut String, ch: char) -> bool {
    match ch {
        '-' => {
            if dashes.len() < 2 {
                dashes.push('-');
            }
            false
        }
        '>' => {
            let closed = dashes == "--";
            dashes.clear();
            closed
        }
        _ => {
            dashes.clear();
            false
        }
    }
}

impl Parser<'_> {
    /// Scan markup until end of input or, when `awaited_close_tag` is set,
    /// until that closing tag appears with no element left open (the tag is
    /// stepped back over and left for the caller).
    pub(super) fn scan_markup(
        &mut self,
        blocks: &mut Vec<Block>,
        awaited_close_tag: Option<&str>,
    ) -> Result<(), RazorError> {
        log::trace!(
            "markup at {} (awaiting {:?})",
            self.cursor.position(),
            awaited_close_tag
        );
        let mut quotes: Vec<char> = Vec::new();
        let mut open_tags: Vec<OpenTag> = Vec::new();
        let mut tag = String::new();
        let mut tag_start = self.cursor.position();
        let mut last_literal: Option<char> = None;
        let mut line_last_literal: Option<char> = None;
        let mut last_ch: Option<char> = None;
        let mut in_comment = false;
        let mut stopped = false;
        push_block(blocks, BlockKind::Literal);

        while let Some(ch) = self.cursor.peek() {
            let is_space = ch.is_whitespace();

            if in_comment {
                if comment_step(&mut tag, ch) {
                    in_comment = false;
                }
            } else if ch == '@' {
                if self.cursor.peek_next() == Some('@') {
                    self.cursor.advance();
                } else {
                    self.cursor.advance();
                    self.scan_code(blocks)?;
                    if tag == "<" || tag == "</" {
                        tag.push('@');
                    }
                    push_block(blocks, BlockKind::Literal);
                    last_ch = None;
                    continue;
                }
            } else if let Some(&quote) = quotes.last() {
                if !tag.is_empty() {
                    tag.push(ch);
                }
                if ch == quote {
                    quotes.pop();
                }
            } else if !tag.is_empty() && (ch == '"' || ch == '\'') {
                quotes.push(ch);
                tag.push(ch);
            } else if ch == '-' {
                if tag == "<!-" {
                    tag.clear();
                    in_comment = true;
                } else if tag.chars().count() > 1 {
                    tag.push(ch);
                } else {
                    tag.clear();
                }
            } else if ch == '<' {
                tag.clear();
                tag.push('<');
                tag_start = self.cursor.position();
            } else if ch == '/' {
                if !tag.is_empty() {
                    if tag.ends_with('/') {
                        tag.clear();
                    } else {
                        tag.push('/');
                    }
                }
            } else if ch == '>' {
                if !tag.is_empty() {
                    let len = tag.chars().count();
                    if len == 1 || (len == 2 && last_ch == Some('/')) || tag.starts_with("<!") {
                        // `<>`, `</>` and declarations such as `<!DOCTYPE html>`
                        tag.clear();
                    } else {
                        tag.push('>');
                        let name = self.tag_name(&tag, tag_start)?;
                        if tag.starts_with("</") {
                            match open_tags.pop() {
                                Some(open) if open.name.eq_ignore_ascii_case(&name) => {}
                                Some(_) => {
                                    return Err(self.error_at(
                                        ErrorKind::MissingMatchingStartTag { tag },
                                        tag_start,
                                    ));
                                }
                                None if awaited_close_tag
                                    .is_some_and(|awaited| awaited.eq_ignore_ascii_case(&name)) =>
                                {
                                    // The '>' has not been consumed yet.
                                    self.step_back(blocks, tag.chars().count() - 1)?;
                                    stopped = true;
                                    break;
                                }
                                None => {
                                    return Err(self.error_at(
                                        ErrorKind::MissingMatchingStartTag { tag },
                                        tag_start,
                                    ));
                                }
                            }
                        } else if !tag.ends_with("/>") && !is_void_element(&name) {
                            open_tags.push(OpenTag {
                                tag: tag.clone(),
                                name,
                                position: tag_start,
                            });
                        }
                        tag.clear();
                    }
                }
            } else if is_space {
                if !tag.is_empty() {
                    if last_ch == Some('<') || last_ch == Some('/') {
                        tag.clear();
                    } else {
                        tag.push(ch);
                    }
                }
            } else if ch == '}'
                && awaited_close_tag.is_some()
                && open_tags.is_empty()
                && last_literal == Some('>')
            {
                // End of the enclosing statement scope.
                self.step_back(blocks, 0)?;
                stopped = true;
                break;
            } else if !tag.is_empty() {
                tag.push(ch);
            }

            if is_space {
                if ch == '\n' {
                    line_last_literal = None;
                    self.flush_padding(blocks);
                    append(blocks, ch);
                } else if line_last_literal.is_some() {
                    append(blocks, ch);
                } else {
                    self.padding.push(ch);
                }
            } else {
                self.flush_padding(blocks);
                append(blocks, ch);
                last_literal = Some(ch);
                line_last_literal = Some(ch);
            }
            last_ch = Some(ch);
            self.cursor.advance();
        }

        if let Some(open) = open_tags.pop() {
            return Err(self.error_at(
                ErrorKind::MissingMatchingEndTag { tag: open.tag },
                open.position,
            ));
        }
        if !stopped {
            self.flush_padding(blocks);
        }
        Ok(())
    }

    /// Scan markup that appears inside a statement block. The region starts
    /// with a tag and ends once that tag is closed and something other than
    /// another tag follows. Content between the tags is scanned as markup.
    pub(super) fn scan_markup_in_statement(
        &mut self,
        blocks: &mut Vec<Block>,
    ) -> Result<(), RazorError> {
        log::trace!("markup in statement at {}", self.cursor.position());
        let mut quotes: Vec<char> = Vec::new();
        let mut tag = String::new();
        let mut tag_start = self.cursor.position();
        let mut open_tag: Option<OpenTag> = None;
        let mut seen_tag = false;
        let mut line_last_literal: Option<char> = None;
        let mut last_ch: Option<char> = None;
        let mut in_comment = false;
        let mut comment_dashes = String::new();
        let mut stopped = false;
        push_block(blocks, BlockKind::Literal);

        while let Some(ch) = self.cursor.peek() {
            let next = self.cursor.peek_next();
            let is_space = ch.is_whitespace();
            let mut inner = false;

            if in_comment {
                if comment_step(&mut comment_dashes, ch) {
                    in_comment = false;
                }
            } else if ch == '@' {
                if !seen_tag && tag.is_empty() {
                    return Err(self.error(ErrorKind::UnexpectedCharacter { ch }));
                }
                if next == Some('@') {
                    self.cursor.advance();
                } else {
                    self.cursor.advance();
                    self.scan_code(blocks)?;
                    if tag == "<" || tag == "</" {
                        tag.push('@');
                    }
                    push_block(blocks, BlockKind::Literal);
                    last_ch = None;
                    continue;
                }
            } else if let Some(&quote) = quotes.last() {
                tag.push(ch);
                if ch == quote {
                    quotes.pop();
                }
            } else if !tag.is_empty() && (ch == '"' || ch == '\'') {
                tag.push(ch);
                quotes.push(ch);
            } else if ch == '-' && !tag.is_empty() {
                if tag == "<!-" {
                    tag.clear();
                    in_comment = true;
                } else {
                    tag.push(ch);
                }
            } else if ch == '<' {
                if !tag.is_empty() {
                    return Err(self.error(ErrorKind::UnexpectedCharacter { ch }));
                }
                if open_tag.is_some() && next != Some('/') {
                    inner = true;
                } else {
                    tag.push('<');
                    tag_start = self.cursor.position();
                    seen_tag = true;
                }
            } else if ch == '/' && !tag.is_empty() {
                if next == Some('/') {
                    inner = true;
                } else {
                    tag.push('/');
                }
            } else if ch == '>' && !tag.is_empty() {
                tag.push('>');
                let name = self.tag_name(&tag, tag_start)?;
                match &open_tag {
                    Some(open) => {
                        if !open.name.eq_ignore_ascii_case(&name) {
                            return Err(self.error_at(
                                ErrorKind::MissingMatchingStartTag { tag },
                                tag_start,
                            ));
                        }
                        open_tag = None;
                    }
                    None if tag.ends_with("/>") || is_void_element(&name) => {}
                    None if tag.starts_with("</") => {
                        return Err(self.error_at(
                            ErrorKind::MissingMatchingStartTag { tag },
                            tag_start,
                        ));
                    }
                    None => {
                        open_tag = Some(OpenTag {
                            tag: tag.clone(),
                            name,
                            position: tag_start,
                        });
                    }
                }
                tag.clear();
            } else if is_space {
                if !tag.is_empty() {
                    if last_ch == Some('<') || last_ch == Some('/') {
                        return Err(self.error(ErrorKind::TagNameExpected));
                    }
                    tag.push(ch);
                }
            } else if !tag.is_empty() {
                tag.push(ch);
            } else if open_tag.is_some() {
                inner = true;
            } else {
                // Not a tag: back to the statement.
                stopped = true;
                break;
            }

            if inner {
                let tag_chars = tag.chars().count();
                self.step_back(blocks, tag_chars)?;
                let awaited = open_tag
                    .as_ref()
                    .map(|open| open.name.clone())
                    .unwrap_or_default();
                self.scan_markup(blocks, Some(&awaited))?;
                push_block(blocks, BlockKind::Literal);
                tag.clear();
                last_ch = None;
                line_last_literal = None;
                continue;
            }

            if is_space {
                if open_tag.is_none() && tag.is_empty() && ch != '\n' {
                    // After a top-level element: belongs to whichever side comes next.
                    self.padding.push(ch);
                } else if ch == '\n' {
                    line_last_literal = None;
                    self.flush_padding(blocks);
                    append(blocks, ch);
                } else if line_last_literal.is_some() {
                    append(blocks, ch);
                } else {
                    self.padding.push(ch);
                }
            } else {
                self.flush_padding(blocks);
                append(blocks, ch);
                line_last_literal = Some(ch);
            }
            last_ch = Some(ch);
            self.cursor.advance();
        }

        if let Some(open) = open_tag {
            return Err(self.error_at(
                ErrorKind::MissingMatchingEndTag { tag: open.tag },
                open.position,
            ));
        }
        if !stopped {
            self.flush_padding(blocks);
        }
        Ok(())
    }

    /// Extract the element name from a complete tag such as `<div class="x">`
    /// or `</div>`.
    fn tag_name(&self, tag: &str, tag_start: Position) -> Result<String, RazorError> {
        let mut name = String::new();
        for ch in tag.chars().skip(1) {
            if ch == '/' && name.is_empty() {
                continue;
            }
            if ch == '>' || ch == '/' {
                break;
            }
            if ch.is_whitespace() {
                if name.is_empty() {
                    return Err(self.error_at(
                        ErrorKind::InvalidHtmlTag {
                            tag: tag.to_string(),
                        },
                        tag_start,
                    ));
                }
                break;
            }
            name.push(ch);
        }
        if name.is_empty() {
            return Err(self.error_at(ErrorKind::TagNameExpected, tag_start));
        }
        Ok(name)
    }
}
