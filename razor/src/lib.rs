pub mod block;
pub mod cursor;
pub mod error;
pub mod parser;
pub mod program;
pub mod sections;

pub use block::{Block, BlockKind};
pub use error::{ErrorKind, Position, RazorError};
pub use parser::{DEFAULT_FILE_PATH, Parser, SECTION_KEYWORD};
pub use program::{Instruction, Program, ValueTable};
pub use sections::ParsedSectionRegistry;

/// Scan a template into its block tree.
pub fn parse(
    source: &str,
    file_path: &str,
    sections: &mut ParsedSectionRegistry,
) -> Result<Vec<Block>, RazorError> {
    Parser::new(source, file_path, sections).parse()
}

/// Scan a template and generate its program.
pub fn compile(
    source: &str,
    file_path: &str,
    sections: &mut ParsedSectionRegistry,
) -> Result<Program, RazorError> {
    let blocks = parse(source, file_path, sections)?;
    Ok(Program::generate(&blocks))
}
