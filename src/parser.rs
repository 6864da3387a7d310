//! Recursive descent parser for Veil rule scripts

use crate::ast::*;
use crate::error::{CompilerError, Result};
use crate::lexer::{Lexer, Token, TokenType};
use crate::symbols::SymbolTable;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    file: String,
    symbols: SymbolTable,
    /// Parameters of the function body being parsed; `$param` stays symbolic
    params: Vec<String>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|t| !matches!(t.token_type, TokenType::Newline | TokenType::Comment(_)))
            .collect();

        if !matches!(tokens.last().map(|t| &t.token_type), Some(TokenType::Eof)) {
            let line = tokens.last().map_or(1, |t| t.line);
            tokens.push(Token {
                token_type: TokenType::Eof,
                line,
                column: 1,
                spaced: true,
            });
        }

        Self {
            tokens,
            current: 0,
            file: "<input>".to_string(),
            symbols: SymbolTable::new(),
            params: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    /// Start from pre-populated symbols (custom variables, imports).
    /// Declarations in the source override them.
    pub fn with_symbols(mut self, symbols: SymbolTable) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn parse(&mut self) -> Result<Program> {
        let mut body = Vec::new();

        while !self.is_at_end() {
            if let Some(statement) = self.parse_statement()? {
                body.push(statement);
            }
        }

        log::debug!(
            "Parsed {} top-level statements from {} ({} variables, {} functions)",
            body.len(),
            self.file,
            self.symbols.variable_count(),
            self.symbols.function_count()
        );

        Ok(Program {
            body,
            symbols: std::mem::take(&mut self.symbols),
        })
    }

    fn parse_statement(&mut self) -> Result<Option<Statement>> {
        let token = self.peek().clone();

        match &token.token_type {
            TokenType::Variable(_) if self.check_next(&TokenType::Equals) => {
                self.parse_variable_declaration().map(Some)
            }
            TokenType::Domain => self.parse_domain_block().map(Some),
            TokenType::Global => {
                self.advance();
                let body = self.parse_block()?;
                Ok(Some(Statement::Global { body }))
            }
            TokenType::Group => self.parse_group_block().map(Some),
            TokenType::If => self.parse_condition_block().map(Some),
            TokenType::Fn => self.parse_function().map(Some),
            TokenType::Import => self.parse_import().map(Some),
            TokenType::Semicolon => {
                self.advance();
                Ok(None)
            }
            _ if self.is_selector_start() => self.parse_rule().map(|rule| Some(Statement::Rule(rule))),
            other if other.is_comparison() => {
                // `.a > .b` splits into two rules, one per side
                log::warn!(
                    "Ignoring '{}' between rules at {}:{}; write child combinators without spaces",
                    other.text(),
                    self.file,
                    token.line
                );
                self.advance();
                Ok(None)
            }
            other => {
                log::debug!(
                    "Skipping unexpected {} at {}:{}",
                    other,
                    self.file,
                    token.line
                );
                self.advance();
                Ok(None)
            }
        }
    }

    fn parse_variable_declaration(&mut self) -> Result<Statement> {
        let token = self.advance().clone();
        let TokenType::Variable(name) = token.token_type else {
            return Err(self.error_at(&token, "variable name"));
        };
        self.consume(&TokenType::Equals, "'='")?;

        let line = token.line;
        let mut parts = Vec::new();
        while !self.is_at_end()
            && self.peek().line == line
            && !self.is_block_keyword()
            && !matches!(
                self.peek().token_type,
                TokenType::Semicolon | TokenType::LeftBrace | TokenType::RightBrace
            )
        {
            parts.push(self.advance().clone());
        }

        if parts.is_empty() {
            return Err(CompilerError::syntax(
                &self.file,
                line,
                "variable value",
                &self.peek().token_type,
            ));
        }

        let value = self.join_tokens(&parts)?.trim().to_string();
        self.symbols.define_variable(&name, value.clone(), line);

        Ok(Statement::VariableDeclaration { name, value, line })
    }

    fn parse_domain_block(&mut self) -> Result<Statement> {
        self.advance(); // @domain
        self.consume(&TokenType::LeftParen, "'(' after @domain")?;

        let mut domains = Vec::new();
        let mut current = String::new();
        while !self.check(&TokenType::RightParen) && !self.is_at_end() {
            let token = self.advance().clone();
            match token.token_type {
                TokenType::Comma => {
                    if !current.trim().is_empty() {
                        domains.push(current.trim().to_string());
                    }
                    current.clear();
                }
                other => current.push_str(&other.text()),
            }
        }
        if !current.trim().is_empty() {
            domains.push(current.trim().to_string());
        }

        self.consume(&TokenType::RightParen, "')' after domain list")?;
        let body = self.parse_block()?;

        Ok(Statement::Domain { domains, body })
    }

    fn parse_group_block(&mut self) -> Result<Statement> {
        self.advance(); // @group
        self.consume(&TokenType::LeftParen, "'(' after @group")?;
        let token = self.advance().clone();
        let TokenType::String(name) = token.token_type else {
            return Err(self.error_at(&token, "group name string"));
        };
        self.consume(&TokenType::RightParen, "')'")?;
        let body = self.parse_block()?;

        Ok(Statement::Group { name, body })
    }

    fn parse_condition_block(&mut self) -> Result<Statement> {
        self.advance(); // @if
        self.consume(&TokenType::LeftParen, "'(' after @if")?;

        let mut parts = Vec::new();
        let mut depth = 0usize;
        loop {
            if self.is_at_end() {
                return Err(CompilerError::syntax(
                    &self.file,
                    self.peek().line,
                    "')'",
                    &TokenType::Eof,
                ));
            }
            match self.peek().token_type {
                TokenType::RightParen if depth == 0 => break,
                TokenType::RightParen => depth -= 1,
                TokenType::LeftParen => depth += 1,
                _ => {}
            }
            parts.push(self.advance().token_type.text());
        }
        self.consume(&TokenType::RightParen, "')'")?;
        let body = self.parse_block()?;

        Ok(Statement::Condition {
            condition: parts.join(" "),
            body,
        })
    }

    fn parse_import(&mut self) -> Result<Statement> {
        let line = self.advance().line; // @import
        self.consume(&TokenType::LeftParen, "'(' after @import")?;
        let token = self.advance().clone();
        let TokenType::String(path) = token.token_type else {
            return Err(self.error_at(&token, "import path string"));
        };
        self.consume(&TokenType::RightParen, "')'")?;

        Ok(Statement::Import { path, line })
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>> {
        self.consume(&TokenType::LeftBrace, "'{'")?;

        let mut body = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if let Some(statement) = self.parse_statement()? {
                body.push(statement);
            }
        }

        self.consume(&TokenType::RightBrace, "'}'")?;
        Ok(body)
    }

    fn parse_function(&mut self) -> Result<Statement> {
        let line = self.advance().line; // fn
        let token = self.advance().clone();
        let name = match token.token_type {
            TokenType::Selector(name) | TokenType::Action(name) => name,
            _ => return Err(self.error_at(&token, "function name")),
        };

        self.consume(&TokenType::LeftParen, "'(' after function name")?;
        let mut params = Vec::new();
        while !self.check(&TokenType::RightParen) && !self.is_at_end() {
            let token = self.advance().clone();
            match token.token_type {
                TokenType::Selector(param) | TokenType::Variable(param) => params.push(param),
                TokenType::Comma => {}
                _ => return Err(self.error_at(&token, "parameter name")),
            }
        }
        self.consume(&TokenType::RightParen, "')'")?;

        // Register before the body so recursive calls resolve
        self.symbols.define_function(&name, params.clone());

        let saved = std::mem::replace(&mut self.params, params.clone());
        let body = self.parse_function_body();
        self.params = saved;
        let body = body?;

        Ok(Statement::Function(FunctionDef {
            name,
            params,
            body,
            line,
        }))
    }

    fn parse_function_body(&mut self) -> Result<Vec<ActionNode>> {
        self.consume(&TokenType::LeftBrace, "'{' before function body")?;

        let mut body = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if self.match_token(&TokenType::Semicolon) {
                continue;
            }
            body.push(self.parse_action_or_block()?);
        }

        self.consume(&TokenType::RightBrace, "'}' after function body")?;
        Ok(body)
    }

    fn parse_rule(&mut self) -> Result<Rule> {
        let line = self.peek().line;
        let selector = self.parse_or()?;

        let action = if self.match_token(&TokenType::Arrow) {
            self.parse_action_or_block()?
        } else if self.check(&TokenType::LeftBrace) {
            let block = self.parse_action_block()?;
            self.parse_optional_guard(block)?
        } else {
            ActionNode::Single(Action::default_hide(line))
        };

        Ok(Rule {
            selector,
            action,
            line,
        })
    }

    fn parse_action_or_block(&mut self) -> Result<ActionNode> {
        let node = if self.check(&TokenType::LeftBrace) {
            self.parse_action_block()?
        } else {
            ActionNode::Single(self.parse_action()?)
        };
        self.parse_optional_guard(node)
    }

    fn parse_optional_guard(&mut self, action: ActionNode) -> Result<ActionNode> {
        if self.match_token(&TokenType::When) {
            let condition = self.parse_guard()?;
            Ok(ActionNode::Guarded {
                action: Box::new(action),
                condition,
            })
        } else {
            Ok(action)
        }
    }

    fn parse_action_block(&mut self) -> Result<ActionNode> {
        self.consume(&TokenType::LeftBrace, "'{'")?;

        let mut actions = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if self.match_token(&TokenType::Semicolon) || self.match_token(&TokenType::Comma) {
                continue;
            }
            actions.push(self.parse_action()?);
        }

        if actions.is_empty() {
            return Err(CompilerError::syntax(
                &self.file,
                self.peek().line,
                "action",
                &self.peek().token_type,
            ));
        }

        self.consume(&TokenType::RightBrace, "'}' after actions")?;
        Ok(ActionNode::Block(actions))
    }

    fn parse_action(&mut self) -> Result<Action> {
        let token = self.advance().clone();
        let (name, is_variable) = match token.token_type {
            TokenType::Action(name) | TokenType::Selector(name) => (name, false),
            TokenType::Variable(name) => (name, true),
            _ => return Err(self.error_at(&token, "action")),
        };

        let args = if self.check(&TokenType::LeftParen) && self.peek().line == token.line {
            self.parse_arguments()?
                .iter()
                .map(PseudoArg::as_text)
                .collect()
        } else {
            Vec::new()
        };

        Ok(Action {
            name,
            args,
            is_variable,
            line: token.line,
        })
    }

    /// Flat comma-separated argument list. Each argument is the raw text of
    /// its tokens; a lone regex literal is kept as a regex.
    fn parse_arguments(&mut self) -> Result<Vec<PseudoArg>> {
        self.consume(&TokenType::LeftParen, "'('")?;

        let mut args = Vec::new();
        let mut current: Vec<Token> = Vec::new();
        let mut depth = 0usize;
        loop {
            if self.is_at_end() {
                return Err(CompilerError::syntax(
                    &self.file,
                    self.peek().line,
                    "')'",
                    &TokenType::Eof,
                ));
            }
            let token = self.advance().clone();
            match token.token_type {
                TokenType::RightParen if depth == 0 => break,
                TokenType::Comma if depth == 0 => {
                    self.finish_argument(&mut args, std::mem::take(&mut current))?;
                }
                TokenType::LeftParen => {
                    depth += 1;
                    current.push(token);
                }
                TokenType::RightParen => {
                    depth -= 1;
                    current.push(token);
                }
                _ => current.push(token),
            }
        }
        self.finish_argument(&mut args, current)?;

        Ok(args)
    }

    fn finish_argument(&self, args: &mut Vec<PseudoArg>, tokens: Vec<Token>) -> Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        if let [Token {
            token_type: TokenType::Regex { pattern, flags },
            ..
        }] = tokens.as_slice()
        {
            args.push(PseudoArg::Regex {
                pattern: pattern.clone(),
                flags: flags.clone(),
            });
            return Ok(());
        }
        args.push(PseudoArg::Text(self.join_tokens(&tokens)?));
        Ok(())
    }

    /// Re-join token text, keeping a single space wherever the source had
    /// whitespace. Variable references are substituted.
    fn join_tokens(&self, tokens: &[Token]) -> Result<String> {
        let mut text = String::new();
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 && token.spaced {
                text.push(' ');
            }
            match &token.token_type {
                TokenType::Variable(name) => text.push_str(&self.resolve_variable(name, token.line)?),
                other => text.push_str(&other.text()),
            }
        }
        Ok(text)
    }

    fn resolve_variable(&self, name: &str, line: usize) -> Result<String> {
        if self.params.iter().any(|p| p == name) {
            return Ok(name.to_string());
        }
        self.symbols
            .variable(name)
            .map(str::to_string)
            .ok_or_else(|| {
                CompilerError::semantic(&self.file, line, format!("Undefined variable: ${}", name))
            })
    }

    // Selector expressions

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.match_token(&TokenType::Or) {
            let right = self.parse_and()?;
            left = Expr::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.match_token(&TokenType::And) {
            let right = self.parse_not()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.match_token(&TokenType::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::negate(operand));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        if self.match_token(&TokenType::LeftParen) {
            let expr = self.parse_or()?;
            self.consume(&TokenType::RightParen, "')'")?;
            return Ok(expr);
        }
        self.parse_selector_chain()
    }

    /// `div.card :visible .x` on one line is an implicit conjunction
    fn parse_selector_chain(&mut self) -> Result<Expr> {
        let line = self.peek().line;
        let mut expr = self.parse_simple_selector()?;

        while self.peek().line == line && self.is_chain_continuation() {
            let next = self.parse_simple_selector()?;
            expr = Expr::and(expr, next);
        }

        Ok(expr)
    }

    fn parse_simple_selector(&mut self) -> Result<Expr> {
        let token = self.peek().clone();

        match token.token_type {
            TokenType::Selector(first) => {
                self.advance();
                let mut value = first;
                // Unspaced fragments form one compound: `div.card`, `a[href]:hover`
                while let TokenType::Selector(next) = &self.peek().token_type {
                    if self.peek().spaced {
                        break;
                    }
                    value.push_str(next);
                    self.advance();
                }
                Ok(Expr::literal(value))
            }
            TokenType::Variable(name) => {
                self.advance();
                Ok(Expr::variable(name))
            }
            TokenType::Pseudo(name) => {
                self.advance();
                let args = if self.check(&TokenType::LeftParen) && !self.peek().spaced {
                    self.parse_arguments()?
                } else {
                    Vec::new()
                };
                Ok(Expr::pseudo(name, args))
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.parse_or()?;
                self.consume(&TokenType::RightParen, "')'")?;
                Ok(expr)
            }
            other => Err(CompilerError::syntax(&self.file, token.line, "selector", &other)),
        }
    }

    // Guards

    fn parse_guard(&mut self) -> Result<Expr> {
        let mut left = self.parse_guard_term()?;
        loop {
            if self.match_token(&TokenType::And) {
                let right = self.parse_guard_term()?;
                left = Expr::and(left, right);
            } else if self.match_token(&TokenType::Or) {
                let right = self.parse_guard_term()?;
                left = Expr::or(left, right);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_guard_term(&mut self) -> Result<Expr> {
        match &self.peek().token_type {
            TokenType::At => self.parse_comparison(),
            TokenType::Pseudo(_) | TokenType::Selector(_) | TokenType::Variable(_) => {
                self.parse_simple_selector()
            }
            other => Err(CompilerError::syntax(
                &self.file,
                self.peek().line,
                "guard condition",
                other,
            )),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        self.consume(&TokenType::At, "'@'")?;
        let token = self.advance().clone();
        let TokenType::Selector(property) = token.token_type else {
            return Err(self.error_at(&token, "property name"));
        };

        let token = self.advance().clone();
        let operator = match &token.token_type {
            TokenType::Less => CompareOp::Less,
            TokenType::Greater => CompareOp::Greater,
            TokenType::LessEqual => CompareOp::LessEqual,
            TokenType::GreaterEqual => CompareOp::GreaterEqual,
            TokenType::EqualEqual | TokenType::Equals => CompareOp::Equal,
            TokenType::Selector(method) if method.starts_with('.') && !token.spaced => {
                CompareOp::from_method(&method[1..])
                    .ok_or_else(|| self.error_at(&token, "comparison method"))?
            }
            _ => return Err(self.error_at(&token, "comparison operator")),
        };

        let value = if operator.is_method() {
            self.consume(&TokenType::LeftParen, "'('")?;
            let value = self.parse_operand()?;
            self.consume(&TokenType::RightParen, "')'")?;
            value
        } else {
            self.parse_operand()?
        };

        Ok(Expr::Comparison {
            property,
            operator,
            value,
        })
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        let token = self.advance().clone();
        match token.token_type {
            TokenType::Number(raw) => Ok(raw
                .parse::<f64>()
                .map(Operand::Number)
                .unwrap_or(Operand::Text(raw))),
            TokenType::String(text) => Ok(Operand::Text(text)),
            TokenType::Regex { pattern, flags } => {
                if flags.contains('i') {
                    Ok(Operand::Text(format!("(?i){}", pattern)))
                } else {
                    Ok(Operand::Text(pattern))
                }
            }
            TokenType::Selector(name) | TokenType::Action(name) => Ok(name
                .parse::<f64>()
                .map(Operand::Number)
                .unwrap_or(Operand::Reference(name))),
            TokenType::Variable(name) if self.params.contains(&name) => Ok(Operand::Reference(name)),
            TokenType::Variable(name) => Ok(Operand::Variable(name)),
            _ => Err(self.error_at(&token, "comparison value")),
        }
    }

    // Token helpers

    fn is_selector_start(&self) -> bool {
        matches!(
            self.peek().token_type,
            TokenType::Selector(_)
                | TokenType::Variable(_)
                | TokenType::Pseudo(_)
                | TokenType::Not
                | TokenType::LeftParen
        )
    }

    fn is_chain_continuation(&self) -> bool {
        matches!(
            self.peek().token_type,
            TokenType::Selector(_)
                | TokenType::Variable(_)
                | TokenType::Pseudo(_)
                | TokenType::LeftParen
        )
    }

    fn is_block_keyword(&self) -> bool {
        matches!(
            self.peek().token_type,
            TokenType::Domain
                | TokenType::Global
                | TokenType::If
                | TokenType::Group
                | TokenType::Import
                | TokenType::Fn
        )
    }

    fn error_at(&self, token: &Token, expected: &str) -> CompilerError {
        CompilerError::syntax(&self.file, token.line, expected, &token.token_type)
    }

    fn match_token(&mut self, token_type: &TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            false
        } else {
            std::mem::discriminant(&self.peek().token_type) == std::mem::discriminant(token_type)
        }
    }

    fn check_next(&self, token_type: &TokenType) -> bool {
        self.tokens.get(self.current + 1).map_or(false, |t| {
            std::mem::discriminant(&t.token_type) == std::mem::discriminant(token_type)
        })
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().token_type, TokenType::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn consume(&mut self, token_type: &TokenType, expected: &str) -> Result<&Token> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            Err(CompilerError::syntax(
                &self.file,
                self.peek().line,
                expected,
                &self.peek().token_type,
            ))
        }
    }
}

/// Tokenize and parse one source unit
pub fn parse_source(source: &str, file: &str, symbols: SymbolTable) -> Result<Program> {
    let tokens = Lexer::new(source).tokenize();
    log::debug!("Tokenized {} tokens from {}", tokens.len(), file);
    Parser::new(tokens)
        .with_file(file)
        .with_symbols(symbols)
        .parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_source(source, "test.veil", SymbolTable::new()).unwrap()
    }

    fn single_rule(source: &str) -> Rule {
        match parse(source).body.into_iter().next() {
            Some(Statement::Rule(rule)) => rule,
            other => panic!("Expected rule, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_rule() {
        let rule = single_rule(".ad -> hide");
        assert_eq!(rule.selector, Expr::literal(".ad"));
        assert_eq!(rule.action, ActionNode::Single(Action::new("hide", vec![], 1)));
    }

    #[test]
    fn test_default_action_is_hide() {
        let program = parse(".a\n.b");
        assert_eq!(program.body.len(), 2);
        match &program.body[1] {
            Statement::Rule(rule) => {
                assert_eq!(rule.selector, Expr::literal(".b"));
                assert_eq!(rule.action, ActionNode::Single(Action::default_hide(2)));
            }
            other => panic!("Expected rule, got {:?}", other),
        }
    }

    #[test]
    fn test_spaced_child_combinator_splits_rules() {
        let program = parse(".a > .b -> hide");
        let selectors: Vec<_> = program
            .body
            .iter()
            .map(|statement| match statement {
                Statement::Rule(rule) => rule.selector.clone(),
                other => panic!("Expected rule, got {:?}", other),
            })
            .collect();
        assert_eq!(selectors, vec![Expr::literal(".a"), Expr::literal(".b")]);
        assert!(TokenType::Greater.is_comparison());
        assert!(!TokenType::Arrow.is_comparison());
    }

    #[test]
    fn test_compound_and_implicit_conjunction() {
        let rule = single_rule("div.card[data-x] :visible -> remove");
        assert_eq!(
            rule.selector,
            Expr::and(Expr::literal("div.card[data-x]"), Expr::pseudo("visible", vec![]))
        );
    }

    #[test]
    fn test_logical_precedence() {
        let rule = single_rule(".a || .b && !.c");
        assert_eq!(
            rule.selector,
            Expr::or(
                Expr::literal(".a"),
                Expr::and(Expr::literal(".b"), Expr::negate(Expr::literal(".c")))
            )
        );
    }

    #[test]
    fn test_parenthesized_group() {
        let rule = single_rule("!(.a || .b) -> remove");
        assert_eq!(
            rule.selector,
            Expr::negate(Expr::or(Expr::literal(".a"), Expr::literal(".b")))
        );
    }

    #[test]
    fn test_pseudo_arguments() {
        let rule = single_rule(r#".x:style(position: fixed):text(/promo/i):size(300x250, >90)"#);
        let parts = rule.selector.conjuncts().into_iter().cloned().collect::<Vec<_>>();
        assert_eq!(parts[1], Expr::pseudo("style", vec![PseudoArg::text("position: fixed")]));
        assert_eq!(
            parts[2],
            Expr::pseudo(
                "text",
                vec![PseudoArg::Regex {
                    pattern: "promo".to_string(),
                    flags: "i".to_string()
                }]
            )
        );
        assert_eq!(
            parts[3],
            Expr::pseudo("size", vec![PseudoArg::text("300x250"), PseudoArg::text(">90")])
        );
    }

    #[test]
    fn test_has_argument_is_raw_selector() {
        let rule = single_rule("div:has(> img.ad, .b)");
        assert_eq!(
            rule.selector,
            Expr::and(
                Expr::literal("div"),
                Expr::pseudo("has", vec![PseudoArg::text("> img.ad, .b")])
            )
        );
    }

    #[test]
    fn test_variable_declaration_and_reference() {
        let program = parse("$ads = .ad, .banner\n$wide = $ads .wide\n$ads -> hide");
        assert_eq!(program.symbols.variable("ads"), Some(".ad, .banner"));
        assert_eq!(program.symbols.variable("wide"), Some(".ad, .banner .wide"));
        match &program.body[2] {
            Statement::Rule(rule) => assert_eq!(rule.selector, Expr::variable("ads")),
            other => panic!("Expected rule, got {:?}", other),
        }
    }

    #[test]
    fn test_undefined_variable_in_value_is_semantic_error() {
        let err = parse_source("$a = $missing", "t.veil", SymbolTable::new()).unwrap_err();
        assert!(matches!(err, CompilerError::Semantic { line: 1, .. }));
    }

    #[test]
    fn test_initial_symbols_are_overridden() {
        let mut symbols = SymbolTable::new();
        symbols.define_variable("label", "Ad".to_string(), 0);
        symbols.define_variable("keep", "yes".to_string(), 0);
        let program = parse_source("$label = \"Sponsored\"", "t.veil", symbols).unwrap();
        assert_eq!(program.symbols.variable("label"), Some("Sponsored"));
        assert_eq!(program.symbols.variable("keep"), Some("yes"));
    }

    #[test]
    fn test_blocks_nest() {
        let program = parse(
            r#"
            @domain(example.com, !shop.example.com) {
                @group("banners") {
                    .ad
                }
                @if(scroll > 500) {
                    .sticky -> remove
                }
            }
            @global { .x }
            "#,
        );
        assert_eq!(program.body.len(), 2);
        match &program.body[0] {
            Statement::Domain { domains, body } => {
                assert_eq!(domains, &vec!["example.com".to_string(), "!shop.example.com".to_string()]);
                assert!(matches!(&body[0], Statement::Group { name, .. } if name == "banners"));
                assert!(
                    matches!(&body[1], Statement::Condition { condition, .. } if condition == "scroll > 500")
                );
            }
            other => panic!("Expected domain block, got {:?}", other),
        }
        assert!(matches!(&program.body[1], Statement::Global { body } if body.len() == 1));
    }

    #[test]
    fn test_guarded_action() {
        let rule = single_rule(".popup -> remove when @width > 400 && :visible");
        match rule.action {
            ActionNode::Guarded { action, condition } => {
                assert_eq!(*action, ActionNode::Single(Action::new("remove", vec![], 1)));
                assert_eq!(
                    condition,
                    Expr::and(
                        Expr::Comparison {
                            property: "width".to_string(),
                            operator: CompareOp::Greater,
                            value: Operand::Number(400.0),
                        },
                        Expr::pseudo("visible", vec![])
                    )
                );
            }
            other => panic!("Expected guarded action, got {:?}", other),
        }
    }

    #[test]
    fn test_method_comparison() {
        let rule = single_rule(r#".x -> hide when @text.startsWith("Ad")"#);
        match rule.action {
            ActionNode::Guarded { condition, .. } => assert_eq!(
                condition,
                Expr::Comparison {
                    property: "text".to_string(),
                    operator: CompareOp::StartsWith,
                    value: Operand::Text("Ad".to_string()),
                }
            ),
            other => panic!("Expected guarded action, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_method_is_syntax_error() {
        let err = parse_source(".x -> hide when @text.sortOf(\"a\")", "t.veil", SymbolTable::new())
            .unwrap_err();
        assert!(matches!(err, CompilerError::Syntax { .. }));
    }

    #[test]
    fn test_action_block_with_guard() {
        let rule = single_rule(".x { blur(5px); opacity(0.3) } when :sticky");
        match rule.action {
            ActionNode::Guarded { action, .. } => match *action {
                ActionNode::Block(actions) => {
                    assert_eq!(actions[0].args, vec!["5px".to_string()]);
                    assert_eq!(actions[1].name, "opacity");
                }
                other => panic!("Expected block, got {:?}", other),
            },
            other => panic!("Expected guarded block, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_action_block_is_error() {
        let err = parse_source(".x -> { }", "t.veil", SymbolTable::new()).unwrap_err();
        assert!(matches!(err, CompilerError::Syntax { .. }));
    }

    #[test]
    fn test_function_definition_and_call() {
        let program = parse("fn boxout(n) { removeparent(n) }\n.trigger -> boxout(2)");
        assert_eq!(program.symbols.function_params("boxout"), Some(&["n".to_string()][..]));
        match &program.body[0] {
            Statement::Function(def) => {
                assert_eq!(def.name, "boxout");
                assert_eq!(
                    def.body,
                    vec![ActionNode::Single(Action::new("removeparent", vec!["n".to_string()], 1))]
                );
            }
            other => panic!("Expected function, got {:?}", other),
        }
        match &program.body[1] {
            Statement::Rule(rule) => assert_eq!(
                rule.action,
                ActionNode::Single(Action::new("boxout", vec!["2".to_string()], 2))
            ),
            other => panic!("Expected rule, got {:?}", other),
        }
    }

    #[test]
    fn test_function_dollar_params_stay_symbolic() {
        let program = parse("fn fade($ms) { fade-out($ms) when @opacity > 0 }");
        match &program.body[0] {
            Statement::Function(def) => {
                assert_eq!(def.params, vec!["ms".to_string()]);
                match &def.body[0] {
                    ActionNode::Guarded { action, .. } => assert_eq!(
                        **action,
                        ActionNode::Single(Action::new("fade-out", vec!["ms".to_string()], 1))
                    ),
                    other => panic!("Expected guarded action, got {:?}", other),
                }
            }
            other => panic!("Expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_variable_action() {
        let program = parse("$act = remove\n.x -> $act");
        match &program.body[1] {
            Statement::Rule(rule) => match &rule.action {
                ActionNode::Single(action) => {
                    assert!(action.is_variable);
                    assert_eq!(action.name, "act");
                }
                other => panic!("Expected single action, got {:?}", other),
            },
            other => panic!("Expected rule, got {:?}", other),
        }
    }

    #[test]
    fn test_import_statement() {
        let program = parse("@import(\"common.veil\")\n.x");
        assert_eq!(
            program.body[0],
            Statement::Import {
                path: "common.veil".to_string(),
                line: 1
            }
        );
    }

    #[test]
    fn test_missing_brace_reports_line() {
        let err = parse_source("@global {\n.a\n", "t.veil", SymbolTable::new()).unwrap_err();
        match err {
            CompilerError::Syntax { expected, found, .. } => {
                assert_eq!(expected, "'}'");
                assert_eq!(found, "end of input");
            }
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_stray_tokens_are_skipped() {
        let program = parse("} ; .a -> hide");
        assert_eq!(program.body.len(), 1);
    }
}
