use super::{
    Parser, SECTION_KEYWORD, append, can_expression_continue, can_expression_start_with,
    opens_text, push_block,
};
use crate::block::{Block, BlockKind};
use crate::error::{ErrorKind, RazorError};

/// Keywords whose parenthesized head may be separated from the keyword by
/// whitespace and is followed by a braced body.
const BLOCK_KEYWORDS: &[&str] = &["if", "for", "while", "switch"];

const ELSE_KEYWORD: &str = "else";

fn closer_of(ch: char) -> Option<char> {
    match ch {
        '{' => Some('}'),
        '(' => Some(')'),
        '[' => Some(']'),
        _ => None,
    }
}

impl Parser<'_> {
    /// Dispatch on the character following `@` (already consumed).
    pub(super) fn scan_code(&mut self, blocks: &mut Vec<Block>) -> Result<(), RazorError> {
        match self.cursor.peek() {
            None => Err(self.error(ErrorKind::EndOfFileFoundAfterAtSign)),
            Some('{') => self.scan_statement_block(blocks, None),
            Some(ch) if can_expression_start_with(ch) => self.scan_expression(blocks),
            Some(ch) => Err(self.error(ErrorKind::NotValidStartOfCodeBlock { ch })),
        }
    }

    /// Scan an implicit (`@Model.name`) or explicit (`@(a + b)`) expression.
    ///
    /// An expression whose first bracketed group is followed by `{` turns into
    /// a statement (`@if (x) { ... }`) and `@section` hands over to the section
    /// scanner.
    pub(super) fn scan_expression(&mut self, blocks: &mut Vec<Block>) -> Result<(), RazorError> {
        log::trace!("expression at {}", self.cursor.position());
        let indent = std::mem::take(&mut self.padding);
        push_block(blocks, BlockKind::Expression);

        let mut waits: Vec<char> = Vec::new();
        let mut wait: Option<char> = None;
        let mut first_scope: Option<char> = None;
        let mut in_text = false;
        let mut check_for_block = false;
        let mut operator = String::new();
        let mut last_significant: Option<char> = None;

        while let Some(ch) = self.cursor.peek() {
            let text = blocks.last().map(|b| b.text.as_str()).unwrap_or_default();

            if check_for_block {
                if ch.is_whitespace() {
                    self.padding.push(ch);
                    self.cursor.advance();
                    continue;
                }
                if ch == '{' {
                    self.flush_padding(blocks);
                    if let Some(block) = blocks.last_mut() {
                        block.kind = BlockKind::Statement;
                    }
                    return self.scan_statement_block(blocks, Some(&operator));
                }
                // `.member` or `[index]` right after the group continues the expression.
                let member_follows = ch == '.'
                    && self.cursor.peek_next().is_some_and(can_expression_continue);
                let chained = self.padding.is_empty() && (ch == '[' || member_follows);
                if !chained {
                    break;
                }
                check_for_block = false;
            }

            if in_text {
                if Some(ch) == wait {
                    wait = waits.pop();
                    in_text = false;
                }
            } else if ch == '(' || ch == '[' {
                let closer = if ch == '(' { ')' } else { ']' };
                if first_scope.is_none() {
                    operator = text.trim().to_string();
                    first_scope = Some(closer);
                } else if let Some(w) = wait {
                    waits.push(w);
                }
                wait = Some(closer);
            } else if let Some(w) = wait {
                if ch == ')' || ch == ']' {
                    if ch != w {
                        return Err(self.error(ErrorKind::InvalidExpressionCharacter { ch }));
                    }
                    wait = waits.pop();
                    check_for_block = wait.is_none() && Some(ch) == first_scope && ch == ')';
                } else if opens_text(ch, last_significant) {
                    waits.push(w);
                    wait = Some(ch);
                    in_text = true;
                }
            } else if !text.is_empty() && !can_expression_continue(ch) {
                if ch.is_whitespace() || ch == '{' {
                    let word = text.trim();
                    if word == SECTION_KEYWORD {
                        blocks.pop();
                        return self.scan_section(blocks);
                    }
                    if ch == '{' || !BLOCK_KEYWORDS.contains(&word) {
                        break;
                    }
                } else if ch == '.' {
                    // A trailing dot is punctuation, not member access.
                    if !self.cursor.peek_next().is_some_and(can_expression_continue) {
                        break;
                    }
                } else {
                    break;
                }
            }

            if ch.is_whitespace() {
                self.padding.push(ch);
            } else {
                self.flush_padding(blocks);
                append(blocks, ch);
                last_significant = Some(ch);
            }
            self.cursor.advance();
        }

        if let Some(expected) = wait {
            let expression = blocks.last().map(|b| b.text.clone()).unwrap_or_default();
            return Err(self.error(ErrorKind::ExpressionMissingEnd {
                expression: format!("@{}", expression),
                expected,
            }));
        }

        // Indentation before a plain expression belongs to the markup before it.
        if !indent.is_empty() {
            if let Some(index) = blocks.len().checked_sub(2) {
                blocks[index].text.push_str(&indent);
            }
        }
        Ok(())
    }

    /// Scan a braced statement block. `operator` is set when the block is the
    /// body of `if`/`for`/... whose head has already been scanned; in that case
    /// the braces are kept as code, otherwise the outer braces are dropped.
    pub(super) fn scan_statement_block(
        &mut self,
        blocks: &mut Vec<Block>,
        operator: Option<&str>,
    ) -> Result<(), RazorError> {
        log::trace!(
            "statement block at {} (operator {:?})",
            self.cursor.position(),
            operator
        );
        let has_operator = operator.is_some();
        let mut chains_else = operator == Some("if");
        if !has_operator {
            push_block(blocks, BlockKind::Statement);
        }

        let start = self.cursor.position();
        let mut first_line = self.cursor.line_text().to_string();
        let mut tracking_first_line = true;
        let mut waits: Vec<char> = Vec::new();
        let mut wait: Option<char> = None;
        let mut first_scope: Option<char> = None;
        let mut in_text = false;
        let mut expect_brace = false;
        let mut last_literal: Option<char> = None;
        let mut line_last_literal: Option<char> = None;
        let mut stopped = false;

        while let Some(ch) = self.cursor.peek() {
            if tracking_first_line {
                if ch == '\n' {
                    tracking_first_line = false;
                } else {
                    first_line.push(ch);
                }
            }
            let mut skip_ch = false;

            if in_text {
                if Some(ch) == wait {
                    wait = waits.pop();
                    in_text = false;
                }
            } else {
                if first_scope.is_none() && ch != '{' && !(expect_brace && ch.is_whitespace()) {
                    return Err(self.error(ErrorKind::CharacterExpected { expected: '{' }));
                }

                if let Some(closer) = closer_of(ch) {
                    if first_scope.is_none() {
                        first_scope = Some(closer);
                        skip_ch = !has_operator;
                        expect_brace = false;
                    } else if let Some(w) = wait {
                        waits.push(w);
                    }
                    wait = Some(closer);
                } else if let Some(w) = wait {
                    if ch == '}' || ch == ')' || ch == ']' {
                        if ch != w {
                            return Err(self.error(ErrorKind::InvalidExpressionCharacter { ch }));
                        }
                        wait = waits.pop();
                        if wait.is_none() && Some(ch) == first_scope {
                            skip_ch = ch == '}' && !has_operator;
                            first_scope = None;
                            if chains_else {
                                chains_else = false;
                                self.flush_padding(blocks);
                                append(blocks, ch);
                                self.cursor.advance();
                                if self.accept_else(blocks)? {
                                    expect_brace = true;
                                    line_last_literal = Some('e');
                                    last_literal = Some('e');
                                    continue;
                                }
                                stopped = true;
                                break;
                            }
                            stopped = true;
                        }
                    } else if opens_text(ch, last_literal) {
                        waits.push(w);
                        wait = Some(ch);
                        in_text = true;
                    } else if ch == '@' && matches!(last_literal, None | Some('{' | '}' | ';')) {
                        return Err(self.error(ErrorKind::UnexpectedAtCharacter));
                    } else if ch == '<' && matches!(last_literal, None | Some('{' | '}' | ';')) {
                        self.step_back(blocks, 0)?;
                        self.scan_markup_in_statement(blocks)?;
                        push_block(blocks, BlockKind::Statement);
                        last_literal = None;
                        line_last_literal = None;
                        continue;
                    }
                }
            }

            if skip_ch {
                self.padding.clear();
                line_last_literal = Some(ch);
            } else if ch.is_whitespace() {
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
            self.cursor.advance();
            if stopped {
                break;
            }
        }

        if wait.is_some() || (!stopped && first_scope.is_some()) || expect_brace {
            if expect_brace {
                return Err(self.error(ErrorKind::CharacterExpected { expected: '{' }));
            }
            return Err(self.error_at(
                ErrorKind::CodeBlockMissingClosingChar {
                    line: first_line.trim().to_string(),
                },
                start,
            ));
        }

        if stopped {
            // The rest of the closing line, up to and including its newline.
            while let Some(ch) = self.cursor.peek() {
                if !ch.is_whitespace() {
                    break;
                }
                self.cursor.advance();
                if ch == '\n' {
                    break;
                }
            }
            if blocks
                .last()
                .is_some_and(|b| b.kind == BlockKind::Statement && b.is_blank())
            {
                blocks.pop();
            }
        } else {
            self.flush_padding(blocks);
        }
        Ok(())
    }

    /// After an `if` body: consume an optional `else` (with the whitespace in
    /// front of it) into the statement. Without one, the whitespace up to the
    /// end of the line is dropped and the rest becomes padding.
    fn accept_else(&mut self, blocks: &mut [Block]) -> Result<bool, RazorError> {
        let mut pending = String::new();
        while let Some(ch) = self.cursor.peek() {
            if !ch.is_whitespace() {
                break;
            }
            pending.push(ch);
            self.cursor.advance();
        }

        let mut matched = 0;
        for expected in ELSE_KEYWORD.chars() {
            if self.cursor.peek() != Some(expected) {
                break;
            }
            self.cursor.advance();
            matched += 1;
        }
        let is_else = matched == ELSE_KEYWORD.len()
            && !self.cursor.peek().is_some_and(can_expression_continue);

        if is_else {
            if let Some(block) = blocks.last_mut() {
                block.text.push_str(&pending);
                block.text.push_str(ELSE_KEYWORD);
            }
            return Ok(true);
        }

        if !self.cursor.step_back(matched) {
            return Err(self.error(ErrorKind::Internal {
                message: format!("cannot step back {} characters", matched),
            }));
        }
        if let Some(newline) = pending.find('\n') {
            self.padding.push_str(&pending[newline + 1..]);
        }
        Ok(false)
    }
}
