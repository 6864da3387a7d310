//! Lexical analysis for Veil rule scripts
//!
//! The tokenizer is total: characters it does not understand are skipped
//! instead of raising an error. Newline and comment tokens are emitted and
//! left for the parser to filter.

use std::fmt;

/// Pseudo-selector names recognized after a `:`. Anything else lexes as part
/// of a CSS selector fragment (`:hover`, `:not(.x)`, `:nth-child(2)`).
pub const PSEUDO_SELECTORS: &[&str] = &[
    "text",
    "size",
    "position",
    "zindex",
    "has-child",
    "has-text",
    "nth-parent",
    "visible",
    "viewport",
    "has",
    "style",
    "smart-container",
    "native-ad",
    "shadow",
    "aspect-ratio",
    "common-dimensions",
    "layout-shift",
    "sticky",
    "auto-play",
    "opens-popup",
    "lazy-loaded",
    "scroll-triggered",
    "contains-image",
    "external-domain",
    "distraction-score",
    "promoted-content",
    "overlay-modal",
    "countdown-timer",
    "empty-after-block",
    "sibling-match",
];

/// Bare words that lex as action tokens
pub const ACTION_WORDS: &[&str] = &[
    "hide",
    "remove",
    "collapse",
    "blur",
    "opacity",
    "remove-parent",
    "clean-url",
    "clean-text",
    "block",
    "delay",
    "fade-out",
    "redirect-link",
    "prevent-click",
    "reduce-zindex",
    "collapse-container",
    "speed",
];

pub fn is_pseudo_name(name: &str) -> bool {
    PSEUDO_SELECTORS.contains(&name)
}

pub fn is_action_word(word: &str) -> bool {
    ACTION_WORDS.contains(&word)
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Keywords
    Domain,
    Global,
    If,
    Group,
    Import,
    Fn,
    When,

    // Literals
    Selector(String),
    String(String),
    Regex { pattern: String, flags: String },
    Number(String),
    Variable(String),
    Pseudo(String),
    Action(String),

    // Operators
    And,          // &&
    Or,           // ||
    Not,          // !
    Less,         // <
    Greater,      // >
    LessEqual,    // <=
    GreaterEqual, // >=
    EqualEqual,   // ==
    Equals,       // =
    Arrow,        // ->
    At,           // @ (property access)

    // Punctuation
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    Comma,
    Colon,
    Semicolon,

    // Special
    Newline,
    Comment(String),
    Eof,
}

impl TokenType {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            TokenType::Less
                | TokenType::Greater
                | TokenType::LessEqual
                | TokenType::GreaterEqual
                | TokenType::EqualEqual
        )
    }

    /// Source-like text of the token, used when the parser re-joins raw
    /// argument and condition text.
    pub fn text(&self) -> String {
        match self {
            TokenType::Domain => "@domain".to_string(),
            TokenType::Global => "@global".to_string(),
            TokenType::If => "@if".to_string(),
            TokenType::Group => "@group".to_string(),
            TokenType::Import => "@import".to_string(),
            TokenType::Fn => "fn".to_string(),
            TokenType::When => "when".to_string(),
            TokenType::Selector(s)
            | TokenType::String(s)
            | TokenType::Number(s)
            | TokenType::Action(s) => s.clone(),
            TokenType::Regex { pattern, flags } => format!("/{}/{}", pattern, flags),
            TokenType::Variable(name) => format!("${}", name),
            TokenType::Pseudo(name) => format!(":{}", name),
            TokenType::And => "&&".to_string(),
            TokenType::Or => "||".to_string(),
            TokenType::Not => "!".to_string(),
            TokenType::Less => "<".to_string(),
            TokenType::Greater => ">".to_string(),
            TokenType::LessEqual => "<=".to_string(),
            TokenType::GreaterEqual => ">=".to_string(),
            TokenType::EqualEqual => "==".to_string(),
            TokenType::Equals => "=".to_string(),
            TokenType::Arrow => "->".to_string(),
            TokenType::At => "@".to_string(),
            TokenType::LeftBrace => "{".to_string(),
            TokenType::RightBrace => "}".to_string(),
            TokenType::LeftParen => "(".to_string(),
            TokenType::RightParen => ")".to_string(),
            TokenType::Comma => ",".to_string(),
            TokenType::Colon => ":".to_string(),
            TokenType::Semicolon => ";".to_string(),
            TokenType::Newline => "\n".to_string(),
            TokenType::Comment(_) | TokenType::Eof => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub line: usize,
    pub column: usize,
    /// Whitespace (or a line break) separates this token from the previous one
    pub spaced: bool,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Selector(s) => write!(f, "selector '{}'", s),
            TokenType::String(s) => write!(f, "string(\"{}\")", s),
            TokenType::Regex { pattern, flags } => write!(f, "regex(/{}/{})", pattern, flags),
            TokenType::Number(n) => write!(f, "number({})", n),
            TokenType::Variable(name) => write!(f, "variable(${})", name),
            TokenType::Pseudo(name) => write!(f, "pseudo-selector(:{})", name),
            TokenType::Action(name) => write!(f, "action({})", name),
            TokenType::Newline => write!(f, "newline"),
            TokenType::Comment(_) => write!(f, "comment"),
            TokenType::Eof => write!(f, "end of input"),
            other => write!(f, "'{}'", other.text()),
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    spaced: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            spaced: false,
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        while !self.is_at_end() {
            self.next_token();
        }

        self.push(TokenType::Eof, self.line, self.column);
        std::mem::take(&mut self.tokens)
    }

    fn next_token(&mut self) {
        self.skip_whitespace_except_newlines();

        let Some(ch) = self.peek() else {
            return;
        };
        let line = self.line;
        let column = self.column;

        match ch {
            '\n' => {
                self.advance();
                self.push(TokenType::Newline, line, column);
                self.spaced = true;
            }
            '#' => {
                let comment = self.read_hash_comment();
                self.push(TokenType::Comment(comment), line, column);
                self.spaced = true;
            }
            '/' if self.peek_next() == Some('/') => {
                self.advance();
                self.advance();
                let comment = self.read_line_comment();
                self.push(TokenType::Comment(comment), line, column);
                self.spaced = true;
            }
            '/' => {
                let token_type = self.read_regex();
                self.push(token_type, line, column);
            }
            '"' | '\'' => {
                let value = self.read_string(ch);
                self.push(TokenType::String(value), line, column);
            }
            '-' if self.peek_next() == Some('>') => self.punct(TokenType::Arrow, 2, line, column),
            '&' if self.peek_next() == Some('&') => self.punct(TokenType::And, 2, line, column),
            '|' if self.peek_next() == Some('|') => self.punct(TokenType::Or, 2, line, column),
            '!' if self.in_operator_position() => self.punct(TokenType::Not, 1, line, column),
            '{' => self.punct(TokenType::LeftBrace, 1, line, column),
            '}' => self.punct(TokenType::RightBrace, 1, line, column),
            '(' => self.punct(TokenType::LeftParen, 1, line, column),
            ')' => self.punct(TokenType::RightParen, 1, line, column),
            ',' => self.punct(TokenType::Comma, 1, line, column),
            ';' => self.punct(TokenType::Semicolon, 1, line, column),
            '=' if self.peek_next() == Some('=') => {
                self.punct(TokenType::EqualEqual, 2, line, column)
            }
            '=' => self.punct(TokenType::Equals, 1, line, column),
            '<' | '>' => self.read_angle(ch, line, column),
            '$' => self.read_variable(line, column),
            '@' => self.read_at(line, column),
            ':' => self.read_colon(line, column),
            c if c.is_ascii_digit() => self.read_numeric(line, column),
            '*' if self
                .peek_next()
                .map_or(false, |n| n.is_ascii_digit() || n == 'x') =>
            {
                self.read_numeric(line, column)
            }
            c if is_selector_start(c) => self.read_word_or_selector(c, line, column),
            _ => {
                self.advance();
            }
        }
    }

    fn push(&mut self, token_type: TokenType, line: usize, column: usize) {
        self.tokens.push(Token {
            token_type,
            line,
            column,
            spaced: self.spaced,
        });
        self.spaced = false;
    }

    fn punct(&mut self, token_type: TokenType, width: usize, line: usize, column: usize) {
        for _ in 0..width {
            self.advance();
        }
        self.push(token_type, line, column);
    }

    fn last_token(&self) -> Option<&TokenType> {
        self.tokens.last().map(|t| &t.token_type)
    }

    /// `!` is negation only at the start of input or right after a logical
    /// operator, an opening brace/paren, an arrow or a rule separator.
    fn in_operator_position(&self) -> bool {
        match self.last_token() {
            None => true,
            Some(t) => matches!(
                t,
                TokenType::And
                    | TokenType::Or
                    | TokenType::Not
                    | TokenType::LeftParen
                    | TokenType::LeftBrace
                    | TokenType::Arrow
                    | TokenType::Newline
                    | TokenType::Semicolon
            ),
        }
    }

    fn in_argument_position(&self) -> bool {
        matches!(
            self.last_token(),
            Some(TokenType::LeftParen) | Some(TokenType::Comma)
        )
    }

    fn skip_whitespace_except_newlines(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() && ch != '\n' {
                self.advance();
                self.spaced = true;
            } else {
                break;
            }
        }
    }

    fn advance(&mut self) -> char {
        if self.position < self.input.len() {
            let ch = self.input[self.position];
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            ch
        } else {
            '\0'
        }
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_next(&self) -> Option<char> {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn read_hash_comment(&mut self) -> String {
        if self.peek_next() == Some('#') && self.peek_at(2) == Some('#') {
            for _ in 0..3 {
                self.advance();
            }
            let mut comment = String::new();
            while !self.is_at_end() {
                if self.peek() == Some('#')
                    && self.peek_next() == Some('#')
                    && self.peek_at(2) == Some('#')
                {
                    for _ in 0..3 {
                        self.advance();
                    }
                    break;
                }
                comment.push(self.advance());
            }
            return comment.trim().to_string();
        }

        self.advance(); // '#'
        self.read_line_comment()
    }

    fn read_line_comment(&mut self) -> String {
        let mut comment = String::new();

        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            comment.push(ch);
            self.advance();
        }

        comment.trim().to_string()
    }

    fn read_string(&mut self, quote: char) -> String {
        self.advance(); // opening quote
        let mut value = String::new();

        while let Some(ch) = self.peek() {
            if ch == '\\' {
                self.advance();
                match self.peek() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(other) => value.push(other),
                    None => break,
                }
                self.advance();
            } else if ch == quote {
                self.advance();
                break;
            } else {
                value.push(ch);
                self.advance();
            }
        }

        value
    }

    fn read_regex(&mut self) -> TokenType {
        self.advance(); // opening '/'
        let mut pattern = String::new();
        let mut flags = String::new();

        while let Some(ch) = self.peek() {
            if ch == '/' {
                self.advance();
                while let Some(flag) = self.peek() {
                    if "gimsuy".contains(flag) {
                        flags.push(flag);
                        self.advance();
                    } else {
                        break;
                    }
                }
                break;
            }
            if ch == '\\' {
                pattern.push(self.advance());
                if !self.is_at_end() {
                    pattern.push(self.advance());
                }
                continue;
            }
            pattern.push(self.advance());
        }

        TokenType::Regex { pattern, flags }
    }

    fn read_angle(&mut self, ch: char, line: usize, column: usize) {
        let next = self.peek_next();
        if next == Some('=') {
            let token_type = if ch == '<' {
                TokenType::LessEqual
            } else {
                TokenType::GreaterEqual
            };
            self.punct(token_type, 2, line, column);
        } else if self.in_argument_position()
            && next.map_or(false, |n| n.is_ascii_digit() || n == '*')
        {
            // Comparison-prefixed size inside an argument list: `>500`, `>300x<250`
            self.read_numeric(line, column);
        } else {
            let token_type = if ch == '<' {
                TokenType::Less
            } else {
                TokenType::Greater
            };
            self.punct(token_type, 1, line, column);
        }
    }

    fn read_numeric(&mut self, line: usize, column: usize) {
        let mut text = String::new();

        while let Some(ch) = self.peek() {
            let glyph = ch.is_ascii_digit() || matches!(ch, '.' | '%' | 'x' | 'X' | '*');
            let comparison = matches!(ch, '<' | '>')
                && !text.is_empty()
                && self
                    .peek_next()
                    .map_or(false, |n| n.is_ascii_digit() || n == '*');
            let leading = text.is_empty() && matches!(ch, '<' | '>');
            if glyph || comparison || leading {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // `10px`, `2000ms`: a unit suffix turns the run into a selector fragment
        if self
            .peek()
            .map_or(false, |c| c.is_alphabetic() || c == '_')
        {
            text.push_str(&self.read_selector());
            self.push(TokenType::Selector(text), line, column);
        } else {
            self.push(TokenType::Number(text), line, column);
        }
    }

    fn read_variable(&mut self, line: usize, column: usize) {
        self.advance(); // '$'
        let name = self.read_while(|c| c.is_alphanumeric() || c == '_');
        if !name.is_empty() {
            self.push(TokenType::Variable(name), line, column);
        }
    }

    fn read_at(&mut self, line: usize, column: usize) {
        let mut word = String::from("@");
        let mut offset = 1;
        while let Some(c) = self.peek_at(offset) {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                word.push(c);
                offset += 1;
            } else {
                break;
            }
        }

        let keyword = match word.as_str() {
            "@domain" => Some(TokenType::Domain),
            "@global" => Some(TokenType::Global),
            "@if" => Some(TokenType::If),
            "@group" => Some(TokenType::Group),
            "@import" => Some(TokenType::Import),
            _ => None,
        };

        if let Some(token_type) = keyword {
            self.punct(token_type, offset, line, column);
        } else if self.peek_next().map_or(false, |c| c.is_ascii_lowercase()) {
            self.punct(TokenType::At, 1, line, column);
        } else if offset > 1 {
            for _ in 0..offset {
                self.advance();
            }
            self.push(TokenType::Selector(word), line, column);
        } else {
            self.advance();
        }
    }

    fn read_colon(&mut self, line: usize, column: usize) {
        let next = self.peek_next();
        if next.map_or(true, |c| c.is_whitespace() || c.is_ascii_digit()) {
            self.punct(TokenType::Colon, 1, line, column);
            return;
        }

        self.advance(); // ':'
        if self.peek() == Some(':') {
            // Pseudo-element, never one of ours
            self.advance();
            let name = self.read_identifier();
            self.push(TokenType::Selector(format!("::{}", name)), line, column);
            return;
        }

        let name = self.read_identifier();
        if name.is_empty() {
            self.push(TokenType::Colon, line, column);
            return;
        }

        if is_pseudo_name(&name) {
            let is_has = name == "has";
            self.push(TokenType::Pseudo(name), line, column);
            if is_has && self.peek() == Some('(') {
                let inner_line = self.line;
                let inner_column = self.column;
                let inner = self.read_balanced();
                self.push(TokenType::LeftParen, inner_line, inner_column);
                self.push(TokenType::String(inner.trim().to_string()), inner_line, inner_column);
                self.push(TokenType::RightParen, inner_line, inner_column);
            }
        } else {
            let mut text = format!(":{}", name);
            if self.peek() == Some('(') {
                text.push('(');
                text.push_str(&self.read_balanced());
                text.push(')');
            }
            self.push(TokenType::Selector(text), line, column);
        }
    }

    /// Consume `( ... )` with nesting and return the text between the outer
    /// parentheses.
    fn read_balanced(&mut self) -> String {
        self.advance(); // '('
        let mut depth = 1;
        let mut content = String::new();

        while let Some(ch) = self.peek() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        break;
                    }
                }
                _ => {}
            }
            content.push(self.advance());
        }

        content
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '-' && self.peek_next() == Some('>') {
                break;
            }
            if c.is_alphanumeric() || c == '_' || c == '-' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if pred(c) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        text
    }

    fn read_word_or_selector(&mut self, first: char, line: usize, column: usize) {
        // Property names after `@` are plain identifiers
        if matches!(self.last_token(), Some(TokenType::At)) {
            let name = self.read_identifier();
            if name.is_empty() {
                self.advance();
            } else {
                self.push(TokenType::Selector(name), line, column);
            }
            return;
        }

        if first.is_ascii_lowercase() {
            let word = self.peek_word();
            let token_type = match word.as_str() {
                "fn" => Some(TokenType::Fn),
                "when" => Some(TokenType::When),
                w if is_action_word(w) => Some(TokenType::Action(word.clone())),
                _ => None,
            };
            if let Some(token_type) = token_type {
                let width = word.chars().count();
                self.punct(token_type, width, line, column);
                return;
            }
        }

        let selector = self.read_selector();
        if selector.is_empty() {
            self.advance();
        } else {
            self.push(TokenType::Selector(selector), line, column);
        }
    }

    fn peek_word(&self) -> String {
        let mut word = String::new();
        let mut offset = 0;
        while let Some(c) = self.peek_at(offset) {
            if c == '-' && self.peek_at(offset + 1) == Some('>') {
                break;
            }
            if c.is_alphanumeric() || c == '_' || c == '-' {
                word.push(c);
                offset += 1;
            } else {
                break;
            }
        }
        word
    }

    /// Read a CSS-like selector fragment. Attribute brackets are taken whole;
    /// the fragment ends at whitespace, punctuation, a `:` or an arrow.
    fn read_selector(&mut self) -> String {
        let mut value = String::new();

        if self.peek() == Some('!') {
            value.push(self.advance());
        }

        while let Some(ch) = self.peek() {
            match ch {
                '[' => {
                    let mut quote: Option<char> = None;
                    while let Some(c) = self.peek() {
                        value.push(self.advance());
                        match quote {
                            Some(q) if c == q => quote = None,
                            Some(_) => {}
                            None if c == '"' || c == '\'' => quote = Some(c),
                            None if c == ']' => break,
                            None => {}
                        }
                    }
                }
                '-' if self.peek_next() == Some('>') => break,
                c if c.is_alphanumeric()
                    || matches!(c, '_' | '-' | '.' | '#' | '*' | '>' | '+' | '~') =>
                {
                    value.push(self.advance());
                }
                _ => break,
            }
        }

        value
    }
}

fn is_selector_start(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | '*' | '!' | '-')
}

/// Tokenize source text in one call
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenType> {
        tokenize(source)
            .into_iter()
            .map(|t| t.token_type)
            .filter(|t| !matches!(t, TokenType::Newline | TokenType::Comment(_)))
            .collect()
    }

    fn sel(s: &str) -> TokenType {
        TokenType::Selector(s.to_string())
    }

    #[test]
    fn test_basic_rule() {
        let tokens = kinds(".ad -> hide");
        assert_eq!(
            tokens,
            vec![
                sel(".ad"),
                TokenType::Arrow,
                TokenType::Action("hide".to_string()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_keywords_and_blocks() {
        let tokens = kinds("@domain(example.com, *.news.org, !shop.com) { .x }");
        assert_eq!(
            tokens,
            vec![
                TokenType::Domain,
                TokenType::LeftParen,
                sel("example.com"),
                TokenType::Comma,
                sel("*.news.org"),
                TokenType::Comma,
                sel("!shop.com"),
                TokenType::RightParen,
                TokenType::LeftBrace,
                sel(".x"),
                TokenType::RightBrace,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_not_in_operator_position() {
        let tokens = kinds("!.ad && !(.x)");
        assert_eq!(tokens[0], TokenType::Not);
        assert_eq!(tokens[1], sel(".ad"));
        assert_eq!(tokens[2], TokenType::And);
        assert_eq!(tokens[3], TokenType::Not);
        assert_eq!(tokens[4], TokenType::LeftParen);
    }

    #[test]
    fn test_not_after_newline() {
        let tokens = kinds(".a -> hide\n!.b");
        assert_eq!(tokens[3], TokenType::Not);
        assert_eq!(tokens[4], sel(".b"));
    }

    #[test]
    fn test_attribute_selector_keeps_negation_text() {
        let tokens = kinds(r#"a[href!="x y"]"#);
        assert_eq!(tokens[0], sel(r#"a[href!="x y"]"#));
    }

    #[test]
    fn test_has_captures_nested_selector() {
        let tokens = kinds("div:has(> a[href*=\"(x)\"], .b)");
        assert_eq!(tokens[0], sel("div"));
        assert_eq!(tokens[1], TokenType::Pseudo("has".to_string()));
        assert_eq!(tokens[2], TokenType::LeftParen);
        assert_eq!(
            tokens[3],
            TokenType::String("> a[href*=\"(x)\"], .b".to_string())
        );
        assert_eq!(tokens[4], TokenType::RightParen);
    }

    #[test]
    fn test_unknown_pseudo_class_is_selector_text() {
        let tokens = kinds("li:nth-child(2n+1):hover");
        assert_eq!(tokens[0], sel("li"));
        assert_eq!(tokens[1], sel(":nth-child(2n+1)"));
        assert_eq!(tokens[2], sel(":hover"));
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds(":size(300x250) :size(>500, *x90) :zindex(>=10)");
        assert_eq!(tokens[0], TokenType::Pseudo("size".to_string()));
        assert_eq!(tokens[2], TokenType::Number("300x250".to_string()));
        assert_eq!(tokens[6], TokenType::Number(">500".to_string()));
        assert_eq!(tokens[8], TokenType::Number("*x90".to_string()));
        assert_eq!(tokens[12], TokenType::GreaterEqual);
        assert_eq!(tokens[13], TokenType::Number("10".to_string()));
    }

    #[test]
    fn test_size_with_both_comparisons() {
        let tokens = kinds(":size(>300x<250)");
        assert_eq!(tokens[2], TokenType::Number(">300x<250".to_string()));
    }

    #[test]
    fn test_unit_suffix_is_selector() {
        let tokens = kinds("blur(5px)");
        assert_eq!(tokens[0], TokenType::Action("blur".to_string()));
        assert_eq!(tokens[2], sel("5px"));
    }

    #[test]
    fn test_property_access_and_comparison() {
        let tokens = kinds("when @width>400 && @text.contains(\"Ad\")");
        assert_eq!(
            tokens,
            vec![
                TokenType::When,
                TokenType::At,
                sel("width"),
                TokenType::Greater,
                TokenType::Number("400".to_string()),
                TokenType::And,
                TokenType::At,
                sel("text"),
                sel(".contains"),
                TokenType::LeftParen,
                TokenType::String("Ad".to_string()),
                TokenType::RightParen,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_property_named_like_action() {
        let tokens = kinds("@opacity < 0.5");
        assert_eq!(tokens[1], sel("opacity"));
        assert_eq!(tokens[2], TokenType::Less);
        assert_eq!(tokens[3], TokenType::Number("0.5".to_string()));
    }

    #[test]
    fn test_unknown_at_word_falls_through() {
        let tokens = kinds("@Media");
        assert_eq!(tokens[0], sel("@Media"));
    }

    #[test]
    fn test_comments() {
        let tokens = tokenize("# note\n.a ### block\ncomment ### // tail\n.b");
        let comments: Vec<_> = tokens
            .iter()
            .filter_map(|t| match &t.token_type {
                TokenType::Comment(c) => Some(c.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(comments, vec!["note", "block\ncomment", "tail"]);
        assert_eq!(kinds("# note\n.a ### x ### .b")[1], sel(".b"));
    }

    #[test]
    fn test_regex_and_strings() {
        let tokens = kinds(r#":text(/spon\/sored/i) 'it\'s'"#);
        assert_eq!(
            tokens[2],
            TokenType::Regex {
                pattern: r"spon\/sored".to_string(),
                flags: "i".to_string()
            }
        );
        assert_eq!(tokens[4], TokenType::String("it's".to_string()));
    }

    #[test]
    fn test_variables() {
        let tokens = kinds("$ads = .ad, .banner\n$ads -> $act");
        assert_eq!(tokens[0], TokenType::Variable("ads".to_string()));
        assert_eq!(tokens[1], TokenType::Equals);
        assert_eq!(tokens[5], TokenType::Variable("ads".to_string()));
        assert_eq!(tokens[7], TokenType::Variable("act".to_string()));
    }

    #[test]
    fn test_colon_separator() {
        let tokens = kinds(":style(position: fixed) :aspect-ratio(16:9)");
        assert_eq!(tokens[2], sel("position"));
        assert_eq!(tokens[3], TokenType::Colon);
        assert_eq!(tokens[4], sel("fixed"));
        assert_eq!(tokens[8], TokenType::Number("16".to_string()));
        assert_eq!(tokens[9], TokenType::Colon);
        assert_eq!(tokens[10], TokenType::Number("9".to_string()));
    }

    #[test]
    fn test_spacing_is_recorded() {
        let tokens = tokenize("a:hover .b");
        assert!(!tokens[1].spaced);
        assert!(tokens[2].spaced);
    }

    #[test]
    fn test_unknown_characters_are_skipped() {
        let tokens = kinds(".a ^ ` .b");
        assert_eq!(tokens, vec![sel(".a"), sel(".b"), TokenType::Eof]);
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize(".a\n  .b");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
    }

    #[test]
    fn test_function_keyword_and_call() {
        let tokens = kinds("fn boxout(n) { removeparent(n) }");
        assert_eq!(tokens[0], TokenType::Fn);
        assert_eq!(tokens[1], sel("boxout"));
        assert_eq!(tokens[6], sel("removeparent"));
    }
}
