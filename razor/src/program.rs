use std::fmt;

use crate::block::{Block, BlockKind};

/// A single instruction of a generated program.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Write the value table entry verbatim.
    EmitLiteral(usize),
    /// Evaluate the value table entry as an expression and write the encoded result.
    EmitEvaluatedExpression(usize),
    /// Run embedded statement code.
    ExecuteStatement(String),
    /// Opens the named section the first time it is met, closes it the second time.
    SectionMarker(String),
}

/// Ordered constant pool of literal and expression source text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTable {
    values: Vec<String>,
}

impl ValueTable {
    /// Append a value and return its index.
    pub fn push(&mut self, value: impl Into<String>) -> usize {
        self.values.push(value.into());
        self.values.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}

/// A linear program generated from a block tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub values: ValueTable,
}

impl Program {
    /// Linearize a block tree depth-first.
    pub fn generate(blocks: &[Block]) -> Program {
        let mut program = Program::default();
        for block in blocks {
            program.push_block(block);
        }
        log::debug!(
            "generated {} instructions, {} values",
            program.instructions.len(),
            program.values.len()
        );
        program
    }

    fn push_block(&mut self, block: &Block) {
        match block.kind {
            BlockKind::Literal => {
                let index = self.values.push(block.text.as_str());
                self.instructions.push(Instruction::EmitLiteral(index));
            }
            BlockKind::Expression => {
                let index = self.values.push(block.text.as_str());
                self.instructions.push(Instruction::EmitEvaluatedExpression(index));
            }
            BlockKind::Statement => {
                self.instructions.push(Instruction::ExecuteStatement(block.text.clone()));
            }
            BlockKind::Section => {
                let name = block.name.clone().unwrap_or_default();
                self.instructions.push(Instruction::SectionMarker(name.clone()));
                for child in &block.children {
                    self.push_block(child);
                }
                self.instructions.push(Instruction::SectionMarker(name));
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            match instruction {
                Instruction::EmitLiteral(i) => {
                    writeln!(f, "literal    #{} {:?}", i, self.values.get(*i).unwrap_or(""))?
                }
                Instruction::EmitEvaluatedExpression(i) => {
                    writeln!(f, "expression #{} {:?}", i, self.values.get(*i).unwrap_or(""))?
                }
                Instruction::ExecuteStatement(text) => writeln!(f, "statement  {:?}", text)?,
                Instruction::SectionMarker(name) => writeln!(f, "section    {}", name)?,
            }
        }
        Ok(())
    }
}
