//! Block text printer.
//!
//! Output parses back to an equal tree: indices, refinements and constraints
//! come first in declaration order, then statements in program order.

use std::fmt::{self, Write};

use crate::core::block::{Block, Index, Refinement, Statement};

pub fn print_block(block: &Block) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = write_block(&mut out, block, 0);
    out
}

fn write_block(out: &mut String, block: &Block, depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    write!(out, "{pad}block {}", block.name)?;
    for tag in &block.tags {
        write!(out, " #{tag}")?;
    }
    writeln!(out, " {{")?;

    let inner = "  ".repeat(depth + 1);
    if !block.comments.is_empty() {
        writeln!(out, "{inner}comments \"{}\"", escape(&block.comments))?;
    }
    for index in &block.indices {
        writeln!(out, "{inner}{}", IndexLine(index))?;
    }
    for refinement in &block.refinements {
        writeln!(out, "{inner}{}", RefLine(refinement))?;
    }
    for constraint in &block.constraints {
        writeln!(out, "{inner}constraint {constraint}")?;
    }
    for stmt in &block.statements {
        match stmt {
            Statement::Block(sub) => write_block(out, sub, depth + 1)?,
            Statement::Op(op) => {
                write!(out, "{inner}op {}", op.name)?;
                for arg in &op.args {
                    write!(out, " {arg}")?;
                }
                writeln!(out)?;
            }
        }
    }
    writeln!(out, "{pad}}}")
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

struct IndexLine<'a>(&'a Index);

impl fmt::Display for IndexLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.0;
        write!(f, "idx {} {}", index.name, index.range)?;
        if !index.affine.is_zero() {
            write!(f, " = {}", index.affine)?;
        }
        Ok(())
    }
}

struct RefLine<'a>(&'a Refinement);

impl fmt::Display for RefLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        write!(f, "ref {} {}", r.dir, r.name)?;
        if let Some(from) = &r.from {
            write!(f, " from {from}")?;
        }
        if r.is_global {
            write!(f, " global")?;
        }
        write!(f, " {} [", r.shape.dtype)?;
        for (i, access) in r.access.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{access}")?;
        }
        write!(f, "] (")?;
        for (i, dim) in r.shape.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", dim.size, dim.stride)?;
        }
        write!(f, ")")
    }
}
