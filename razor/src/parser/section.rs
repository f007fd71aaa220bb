use super::{Parser, SECTION_KEYWORD, can_section_contain, can_section_start_with, prune, shift};
use crate::block::Block;
use crate::error::{ErrorKind, RazorError};

impl Parser<'_> {
    /// Scan `@section Name { ... }`; the keyword has already been consumed.
    pub(super) fn scan_section(&mut self, blocks: &mut Vec<Block>) -> Result<(), RazorError> {
        let keyword = format!("@{}", SECTION_KEYWORD);
        let start = self.cursor.position_back(keyword.chars().count());
        log::trace!("section at {}", start);
        if self.in_section {
            return Err(self.error_at(ErrorKind::SectionsCannotBeNested, start));
        }

        let mut spaces = 0;
        while self.cursor.peek().is_some_and(char::is_whitespace) {
            self.cursor.advance();
            spaces += 1;
        }
        if spaces == 0 {
            return Err(self.error(ErrorKind::WhiteSpaceExpectedAfter { keyword }));
        }

        let name_start = self.cursor.position();
        let mut name = String::new();
        while let Some(ch) = self.cursor.peek() {
            if ch.is_whitespace() || ch == '{' {
                break;
            }
            name.push(ch);
            self.cursor.advance();
        }

        let Some(first) = name.chars().next() else {
            return Err(self.error(ErrorKind::SectionNameExpectedAfterKeyword { keyword }));
        };
        if !can_section_start_with(first) {
            return Err(self.error_at(
                ErrorKind::SectionNameCannotStartWith { ch: first },
                name_start,
            ));
        }
        if let Some((index, ch)) = name.char_indices().find(|&(_, ch)| !can_section_contain(ch)) {
            return Err(self.error_at(
                ErrorKind::SectionNameCannotInclude { ch },
                shift(name_start, &name[..index]),
            ));
        }

        let declared = self
            .sections
            .declare(&name, &self.file_path)
            .map_err(str::to_string);
        if let Err(earlier) = declared {
            let note = format!("'{}' was first defined in '{}'", name, earlier);
            return Err(self
                .error_at(ErrorKind::SectionIsAlreadyDefined { name }, name_start)
                .with_note(note));
        }

        match self.cursor.skip_while(char::is_whitespace) {
            Some('{') => {}
            Some(ch) => return Err(self.error(ErrorKind::UnexpectedLiteralFollowingSection { ch })),
            None => return Err(self.error(ErrorKind::CharacterExpected { expected: '{' })),
        }

        self.in_section = true;
        let mut children = Vec::new();
        let scanned = self.scan_statement_block(&mut children, None);
        self.in_section = false;
        scanned?;

        log::debug!("section '{}' with {} blocks", name, children.len());
        blocks.push(Block::section(name, prune(children)));
        Ok(())
    }
}
