//! Block text parser implementation.

use crate::core::affine::Affine;
use crate::core::block::{Block, Index, Op, RefDir, Refinement, Statement};
use crate::core::error::ParseError;
use crate::core::shape::{DataType, Dim, TensorShape};

pub fn parse_program(text: &str) -> Result<Block, ParseError> {
    let mut parser = Parser::new(text);
    parser.skip_whitespace(true);
    let block = parser.parse_block()?;
    parser.skip_whitespace(true);
    if !parser.is_eof() {
        return Err(parser.error("unexpected content after the top-level block"));
    }
    Ok(block)
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let line = self.text[..self.pos].matches('\n').count() + 1;
        ParseError::new(line, message)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comment runs to the end of the line
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace(true);
        self.current_char()
    }

    fn try_read(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), ParseError> {
        if !self.try_read(ch) {
            let found = self.current_char();
            return Err(self.error(format!("expected '{ch}' but found {found:?}")));
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> Result<&'a str, ParseError> {
        self.skip_whitespace(true);
        let start = self.pos;
        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            Some(ch) => return Err(self.error(format!("expected identifier but found '{ch}'"))),
            None => return Err(self.error("expected identifier but found EOF")),
        }
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(&self.text[start..self.pos])
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        let word = self.read_identifier()?;
        if word != keyword {
            return Err(self.error(format!("expected `{keyword}` but found `{word}`")));
        }
        Ok(())
    }

    fn read_number(&mut self) -> Result<u64, ParseError> {
        self.skip_whitespace(true);
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        let digits = &self.text[start..self.pos];
        if digits.is_empty() {
            return Err(self.error("expected number"));
        }
        digits
            .parse()
            .map_err(|_| self.error(format!("number `{digits}` out of range")))
    }

    fn read_signed(&mut self) -> Result<i64, ParseError> {
        let negative = self.try_read('-');
        let magnitude = self.read_number()?;
        let value = i64::try_from(magnitude).map_err(|_| self.error("number out of range"))?;
        Ok(if negative { -value } else { value })
    }

    fn read_string(&mut self) -> Result<String, ParseError> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            let Some(ch) = self.current_char() else {
                return Err(self.error("unterminated string"));
            };
            self.advance();
            match ch {
                '"' => return Ok(out),
                '\\' => {
                    let escaped = self.current_char();
                    self.advance();
                    match escaped {
                        Some('n') => out.push('\n'),
                        Some('"') => out.push('"'),
                        Some('\\') => out.push('\\'),
                        other => return Err(self.error(format!("invalid escape {other:?}"))),
                    }
                }
                ch => out.push(ch),
            }
        }
    }

    /// Next non-blank word on the current line, if any.
    fn read_word_on_line(&mut self) -> Option<&'a str> {
        self.skip_whitespace(false);
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() || ch == ';' || ch == '{' || ch == '}' {
                break;
            }
            self.advance();
        }
        (self.pos > start).then(|| &self.text[start..self.pos])
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect_keyword("block")?;
        let mut block = Block::new(self.read_identifier()?);
        while self.try_read('#') {
            let tag = self.read_identifier()?;
            block.tags.insert(tag.to_string());
        }
        self.expect('{')?;
        loop {
            if self.try_read('}') {
                return Ok(block);
            }
            if self.is_eof() {
                return Err(self.error(format!("unterminated block `{}`", block.name)));
            }
            self.parse_item(&mut block)?;
        }
    }

    fn parse_item(&mut self, block: &mut Block) -> Result<(), ParseError> {
        self.skip_whitespace(true);
        let save = self.pos;
        let keyword = self.read_identifier()?;
        match keyword {
            "comments" => block.comments = self.read_string()?,
            "idx" => {
                let name = self.read_identifier()?;
                let range = self.read_number()?;
                let mut index = Index::new(name, range);
                if self.try_read('=') {
                    index.affine = self.parse_affine()?;
                }
                block.indices.push(index);
            }
            "ref" => {
                let refinement = self.parse_refinement()?;
                if block.refinement(&refinement.name).is_some() {
                    return Err(self.error(format!("duplicate refinement `{}`", refinement.name)));
                }
                block.refinements.push(refinement);
            }
            "constraint" => {
                let constraint = self.parse_affine()?;
                block.constraints.push(constraint);
            }
            "op" => {
                let name = self.read_identifier()?;
                let mut args = Vec::new();
                while let Some(word) = self.read_word_on_line() {
                    args.push(word.to_string());
                }
                block.statements.push(Statement::Op(Op::new(name, args)));
            }
            "block" => {
                self.pos = save;
                let sub = self.parse_block()?;
                block.statements.push(sub.into());
            }
            other => return Err(self.error(format!("unknown item `{other}`"))),
        }
        Ok(())
    }

    fn parse_refinement(&mut self) -> Result<Refinement, ParseError> {
        let dir_name = self.read_identifier()?;
        let dir = RefDir::from_name(dir_name)
            .ok_or_else(|| self.error(format!("unknown refinement direction `{dir_name}`")))?;
        let name = self.read_identifier()?.to_string();

        let mut from = None;
        let mut is_global = false;
        let mut word = self.read_identifier()?;
        if word == "from" {
            from = Some(self.read_identifier()?.to_string());
            word = self.read_identifier()?;
        }
        if word == "global" {
            is_global = true;
            word = self.read_identifier()?;
        }
        let dtype = DataType::from_name(word).ok_or_else(|| self.error(format!("unknown data type `{word}`")))?;

        self.expect('[')?;
        let mut access = Vec::new();
        if !self.try_read(']') {
            loop {
                access.push(self.parse_affine()?);
                if self.try_read(']') {
                    break;
                }
                self.expect(',')?;
            }
        }

        self.expect('(')?;
        let mut dims = Vec::new();
        if !self.try_read(')') {
            loop {
                let size = self.read_number()?;
                self.expect(':')?;
                let stride = self.read_signed()?;
                dims.push(Dim::new(size, stride));
                if self.try_read(')') {
                    break;
                }
                self.expect(',')?;
            }
        }
        if access.len() != dims.len() {
            return Err(self.error(format!(
                "refinement `{name}` has {} access entries for {} dimensions",
                access.len(),
                dims.len()
            )));
        }

        let mut refinement = Refinement::new(dir, name, TensorShape::new(dtype, dims), access).with_global(is_global);
        refinement.from = from;
        Ok(refinement)
    }

    fn parse_affine(&mut self) -> Result<Affine, ParseError> {
        let mut affine = Affine::default();
        let mut sign = if self.try_read('-') { -1 } else { 1 };
        loop {
            self.parse_term(sign, &mut affine)?;
            self.skip_whitespace(false);
            match self.current_char() {
                Some('+') => sign = 1,
                Some('-') => sign = -1,
                _ => return Ok(affine),
            }
            self.advance();
        }
    }

    fn parse_term(&mut self, sign: i64, affine: &mut Affine) -> Result<(), ParseError> {
        match self.peek() {
            Some(ch) if ch.is_ascii_digit() => {
                let value = i64::try_from(self.read_number()?).map_err(|_| self.error("number out of range"))?;
                if self.try_read('*') {
                    let name = self.read_identifier()?;
                    affine.add_term(name, sign * value);
                } else {
                    affine.add_constant(sign * value);
                }
            }
            _ => {
                let name = self.read_identifier()?;
                affine.add_term(name, sign);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_program() {
        let text = r#"
; a tiny program
block main #main {
  ref in A global f32 [0, 0] (4:3, 3:1)
  block kernel #kernel #contraction {
    idx i 4
    idx j 3
    idx n 1 = 2*batch + 1
    ref in a from A global f32 [i, j] (1:3, 1:1)
    constraint 3 - i
    op load a   ; trailing comment
  }
}
"#;
        let program = parse_program(text).expect("parses");
        assert_eq!(program.name, "main");
        assert!(program.has_tag("main"));
        let kernel = program.sub_block(0, false).expect("kernel");
        assert!(kernel.has_tag("contraction"));
        assert_eq!(kernel.indices.len(), 3);
        assert_eq!(kernel.indices[2].affine, Affine::term("batch", 2) + Affine::constant(1));
        let a = &kernel.refinements[0];
        assert_eq!(a.from.as_deref(), Some("A"));
        assert!(a.is_global);
        assert_eq!(a.access[0], Affine::var("i"));
        assert_eq!(kernel.constraints[0], Affine::constant(3) - Affine::var("i"));
        assert_eq!(kernel.statements, vec![Statement::Op(Op::new("load", ["a"]))]);
    }

    #[test]
    fn comments_may_hold_semicolons() {
        let program = parse_program("block main {\n  comments \"4 3 ;3 1 .2 1 ;3 1 \"\n}\n").expect("parses");
        assert_eq!(program.comments, "4 3 ;3 1 .2 1 ;3 1 ");
    }

    #[test]
    fn negative_terms_and_strides() {
        let program = parse_program("block b { ref none x f32 [-k + 2, -3] (2:-1, 1:1) }").expect("parses");
        let x = &program.refinements[0];
        assert_eq!(x.access[0], Affine::constant(2) - Affine::var("k"));
        assert_eq!(x.access[1], Affine::constant(-3));
        assert_eq!(x.shape.dims[0], Dim::new(2, -1));
    }

    #[test]
    fn errors_report_lines() {
        let err = parse_program("block main {\n  idx i\n}").expect_err("range missing");
        assert_eq!(err.line, 3);
        let err = parse_program("block main {\n  ref sideways x f32 [] ()\n}").expect_err("bad dir");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("sideways"));
        let err = parse_program("block main {\n  ref in x f32 [i] ()\n}").expect_err("rank mismatch");
        assert!(err.message.contains("1 access entries for 0 dimensions"));
    }

    #[test]
    fn rejects_trailing_content_and_duplicates() {
        assert!(parse_program("block a {} block b {}").is_err());
        assert!(parse_program("block a { ref in x f32 [] () ref in x f32 [] () }").is_err());
        assert!(parse_program("block a {").is_err());
    }
}
