use std::collections::{BTreeMap, BTreeSet};

use sg_core::SourceLocation;
use sg_parser::ast::*;

pub(crate) type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Module,
    Function,
    Block,
    Catch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Declaration {
    pub location: SourceLocation,
    /// `var`, function and import bindings exist before their statement runs.
    pub hoisted: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ScopeInfo {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub declarations: BTreeMap<String, Declaration>,
    pub usages: BTreeMap<String, Vec<SourceLocation>>,
    pub function_params: BTreeSet<String>,
}

impl ScopeInfo {
    fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            declarations: BTreeMap::new(),
            usages: BTreeMap::new(),
            function_params: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ScopeTree {
    pub scopes: Vec<ScopeInfo>,
    pub category_warnings: Vec<String>,
}

impl ScopeTree {
    pub fn ancestors(&self, scope: ScopeId) -> impl Iterator<Item = &ScopeInfo> + '_ {
        std::iter::successors(self.scopes[scope].parent, |id| self.scopes[*id].parent)
            .map(|id| &self.scopes[id])
    }
}

/// Members that only exist on constructed geometry instances.
const IMPERATIVE_ONLY_MEMBERS: &[&str] = &[
    "clone",
    "dispose",
    "computeBoundingSphere",
    "computeBoundingBox",
    "computeVertexNormals",
    "attributes",
    "setAttribute",
    "getAttribute",
    "setIndex",
    "setFromPoints",
    "translate",
    "rotateX",
    "rotateY",
    "rotateZ",
    "scale",
    "center",
    "boundingSphere",
    "boundingBox",
    "index",
];

pub(crate) fn build_scope_tree(program: &Program) -> ScopeTree {
    let mut builder = ScopeBuilder {
        scopes: vec![ScopeInfo::new(ScopeKind::Module, None)],
        current: 0,
        declarative_geometry: BTreeMap::new(),
        category_warnings: Vec::new(),
        warned: BTreeSet::new(),
    };
    builder.walk_statements(&program.body);
    ScopeTree {
        scopes: builder.scopes,
        category_warnings: builder.category_warnings,
    }
}

struct ScopeBuilder {
    scopes: Vec<ScopeInfo>,
    current: ScopeId,
    declarative_geometry: BTreeMap<String, (String, SourceLocation)>,
    category_warnings: Vec<String>,
    warned: BTreeSet<(String, String)>,
}

impl ScopeBuilder {
    fn enter(&mut self, kind: ScopeKind) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(ScopeInfo::new(kind, Some(self.current)));
        self.scopes[self.current].children.push(id);
        let previous = self.current;
        self.current = id;
        previous
    }

    fn leave(&mut self, previous: ScopeId) {
        self.current = previous;
    }

    fn nearest_function_scope(&self) -> ScopeId {
        let mut id = self.current;
        loop {
            let scope = &self.scopes[id];
            if matches!(scope.kind, ScopeKind::Function | ScopeKind::Module) {
                return id;
            }
            match scope.parent {
                Some(parent) => id = parent,
                None => return id,
            }
        }
    }

    fn declare_in(&mut self, scope: ScopeId, ident: &Ident, hoisted: bool) {
        self.scopes[scope]
            .declarations
            .entry(ident.name.clone())
            .or_insert(Declaration {
                location: ident.location,
                hoisted,
            });
    }

    fn declare(&mut self, ident: &Ident, hoisted: bool) {
        self.declare_in(self.current, ident, hoisted);
    }

    fn declare_pattern(&mut self, pattern: &Pattern, kind: VarKind) {
        for ident in pattern.bound_names() {
            match kind {
                VarKind::Var => {
                    let scope = self.nearest_function_scope();
                    self.declare_in(scope, ident, true);
                }
                VarKind::Let | VarKind::Const => self.declare(ident, false),
            }
        }
        self.walk_pattern_expressions(pattern);
    }

    fn record_usage(&mut self, ident: &Ident) {
        self.scopes[self.current]
            .usages
            .entry(ident.name.clone())
            .or_default()
            .push(ident.location);
    }

    fn walk_statements(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.walk_statement(statement);
        }
    }

    fn walk_block(&mut self, statements: &[Stmt]) {
        let previous = self.enter(ScopeKind::Block);
        self.walk_statements(statements);
        self.leave(previous);
    }

    fn walk_statement(&mut self, statement: &Stmt) {
        match statement {
            Stmt::Var(decl) => self.walk_var_decl(decl),
            Stmt::Function(function) => {
                if let Some(id) = &function.id {
                    self.declare(id, true);
                }
                self.walk_function(function, false);
            }
            Stmt::Class(class) => {
                if let Some(id) = &class.id {
                    self.declare(id, false);
                }
                self.walk_class(class, false);
            }
            Stmt::Expr(expr) => self.walk_expr(expr),
            Stmt::Block(body) => self.walk_block(body),
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.walk_expr(test);
                self.walk_statement(consequent);
                if let Some(alternate) = alternate {
                    self.walk_statement(alternate);
                }
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let previous = self.enter(ScopeKind::Block);
                match init {
                    Some(ForInit::Var(decl)) => self.walk_var_decl(decl),
                    Some(ForInit::Expr(expr)) => self.walk_expr(expr),
                    None => {}
                }
                if let Some(test) = test {
                    self.walk_expr(test);
                }
                if let Some(update) = update {
                    self.walk_expr(update);
                }
                self.walk_statement(body);
                self.leave(previous);
            }
            Stmt::ForIn { head, right, body } | Stmt::ForOf { head, right, body } => {
                let previous = self.enter(ScopeKind::Block);
                match head {
                    ForHead::Var(kind, pattern) => self.declare_pattern(pattern, *kind),
                    ForHead::Target(pattern) => self.walk_pattern_expressions(pattern),
                }
                self.walk_expr(right);
                self.walk_statement(body);
                self.leave(previous);
            }
            Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
                self.walk_expr(test);
                self.walk_statement(body);
            }
            Stmt::Return(argument) => {
                if let Some(argument) = argument {
                    self.walk_expr(argument);
                }
            }
            Stmt::Throw(argument) => self.walk_expr(argument),
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                self.walk_block(block);
                if let Some(handler) = handler {
                    let previous = self.enter(ScopeKind::Catch);
                    if let Some(param) = &handler.param {
                        for ident in param.bound_names() {
                            self.declare(ident, true);
                        }
                        self.walk_pattern_expressions(param);
                    }
                    self.walk_statements(&handler.body);
                    self.leave(previous);
                }
                if let Some(finalizer) = finalizer {
                    self.walk_block(finalizer);
                }
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => {
                self.walk_expr(discriminant);
                let previous = self.enter(ScopeKind::Block);
                for case in cases {
                    if let Some(test) = &case.test {
                        self.walk_expr(test);
                    }
                    self.walk_statements(&case.consequent);
                }
                self.leave(previous);
            }
            Stmt::Labeled { body, .. } => self.walk_statement(body),
            Stmt::Import(import) => {
                for local in &import.locals {
                    self.declare(local, true);
                }
            }
            Stmt::Export(export) => match export {
                ExportDecl::Declaration(statement) | ExportDecl::DefaultDeclaration(statement) => {
                    self.walk_statement(statement)
                }
                ExportDecl::DefaultExpr(expr) => self.walk_expr(expr),
                ExportDecl::Named { .. } | ExportDecl::All { .. } => {}
            },
            Stmt::Break(_) | Stmt::Continue(_) | Stmt::Empty | Stmt::Debugger => {}
        }
    }

    fn walk_var_decl(&mut self, decl: &VarDecl) {
        for declarator in &decl.declarators {
            self.declare_pattern(&declarator.target, decl.kind);
            if let Some(init) = &declarator.init {
                if let (Pattern::Ident(ident), Some(element)) =
                    (&declarator.target, created_element_type(init))
                {
                    if element.ends_with("Geometry") {
                        self.declarative_geometry
                            .insert(ident.name.clone(), (element.to_string(), ident.location));
                    }
                }
                self.walk_expr(init);
            }
        }
    }

    fn walk_function(&mut self, function: &Function, is_expression: bool) {
        let previous = self.enter(ScopeKind::Function);
        if is_expression {
            if let Some(id) = &function.id {
                self.declare(id, true);
            }
        }
        for param in &function.params {
            for ident in param.bound_names() {
                self.declare(ident, true);
                self.scopes[self.current]
                    .function_params
                    .insert(ident.name.clone());
            }
        }
        for param in &function.params {
            self.walk_pattern_expressions(param);
        }
        match &function.body {
            FunctionBody::Block(body) => self.walk_statements(body),
            FunctionBody::Expr(expr) => self.walk_expr(expr),
        }
        self.leave(previous);
    }

    fn walk_class(&mut self, class: &Class, is_expression: bool) {
        if let Some(super_class) = &class.super_class {
            self.walk_expr(super_class);
        }
        let previous = self.enter(ScopeKind::Block);
        if is_expression {
            if let Some(id) = &class.id {
                self.declare(id, true);
            }
        }
        for member in &class.members {
            match member {
                ClassMember::Method { key, function, .. } => {
                    self.walk_prop_key(key);
                    self.walk_function(function, false);
                }
                ClassMember::Field { key, value, .. } => {
                    self.walk_prop_key(key);
                    if let Some(value) = value {
                        let field_scope = self.enter(ScopeKind::Function);
                        self.walk_expr(value);
                        self.leave(field_scope);
                    }
                }
                ClassMember::StaticBlock(body) => {
                    let block_scope = self.enter(ScopeKind::Function);
                    self.walk_statements(body);
                    self.leave(block_scope);
                }
            }
        }
        self.leave(previous);
    }

    fn walk_prop_key(&mut self, key: &PropKey) {
        if let PropKey::Computed(expr) = key {
            self.walk_expr(expr);
        }
    }

    /// Visits the expressions inside a binding or assignment pattern (defaults,
    /// computed keys, member targets) without counting the bound names as reads.
    fn walk_pattern_expressions(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Ident(_) => {}
            Pattern::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectPatternProp::KeyValue { key, value } => {
                            self.walk_prop_key(key);
                            self.walk_pattern_expressions(value);
                        }
                        ObjectPatternProp::Shorthand { default, .. } => {
                            if let Some(default) = default {
                                self.walk_expr(default);
                            }
                        }
                        ObjectPatternProp::Rest(rest) => self.walk_pattern_expressions(rest),
                    }
                }
            }
            Pattern::Array(elements) => {
                for element in elements.iter().flatten() {
                    self.walk_pattern_expressions(element);
                }
            }
            Pattern::Rest(inner) => self.walk_pattern_expressions(inner),
            Pattern::Assign { target, default } => {
                self.walk_pattern_expressions(target);
                self.walk_expr(default);
            }
            Pattern::Expr(expr) => self.walk_expr(expr),
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident(ident) => self.record_usage(ident),
            Expr::This
            | Expr::Super
            | Expr::ImportMeta
            | Expr::NewTarget
            | Expr::Literal(_) => {}
            Expr::Template {
                tag, expressions, ..
            } => {
                if let Some(tag) = tag {
                    self.walk_expr(tag);
                }
                for expr in expressions {
                    self.walk_expr(expr);
                }
            }
            Expr::Array(elements) => {
                for element in elements.iter().flatten() {
                    self.walk_expr(element);
                }
            }
            Expr::Object(props) => {
                for prop in props {
                    match prop {
                        Prop::KeyValue { key, value } => {
                            self.walk_prop_key(key);
                            self.walk_expr(value);
                        }
                        Prop::Shorthand { ident, default } => {
                            self.record_usage(ident);
                            if let Some(default) = default {
                                self.walk_expr(default);
                            }
                        }
                        Prop::Method { key, function } => {
                            self.walk_prop_key(key);
                            self.walk_function(function, false);
                        }
                        Prop::Spread(inner) => self.walk_expr(inner),
                    }
                }
            }
            Expr::Function(function) => self.walk_function(function, true),
            Expr::Class(class) => self.walk_class(class, true),
            Expr::Unary { argument, .. }
            | Expr::Update { argument, .. }
            | Expr::Spread(argument)
            | Expr::Await(argument)
            | Expr::ImportCall(argument) => self.walk_expr(argument),
            Expr::Yield(argument) => {
                if let Some(argument) = argument {
                    self.walk_expr(argument);
                }
            }
            Expr::Binary { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
            Expr::Assign { op, target, value } => {
                match target.as_ref() {
                    Pattern::Ident(ident) if op != "=" => self.record_usage(ident),
                    _ => self.walk_pattern_expressions(target),
                }
                self.walk_expr(value);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.walk_expr(test);
                self.walk_expr(consequent);
                self.walk_expr(alternate);
            }
            Expr::Call {
                callee, arguments, ..
            }
            | Expr::New { callee, arguments } => {
                self.walk_expr(callee);
                for argument in arguments {
                    self.walk_expr(argument);
                }
            }
            Expr::Member {
                object, property, ..
            } => {
                self.check_category_confusion(object, property);
                self.walk_expr(object);
                if let MemberProp::Computed(inner) = property {
                    self.walk_expr(inner);
                }
            }
            Expr::Sequence(expressions) => {
                for expr in expressions {
                    self.walk_expr(expr);
                }
            }
        }
    }

    fn check_category_confusion(&mut self, object: &Expr, property: &MemberProp) {
        let Some(ident) = object.as_ident() else {
            return;
        };
        let Some(member) = property.static_name() else {
            return;
        };
        if !IMPERATIVE_ONLY_MEMBERS.contains(&member) {
            return;
        }
        let Some((element, declared_at)) = self.declarative_geometry.get(&ident.name).cloned()
        else {
            return;
        };
        if ident.location <= declared_at {
            return;
        }
        let key = (ident.name.clone(), member.to_string());
        if !self.warned.insert(key) {
            return;
        }
        self.category_warnings.push(format!(
            "'{}' holds a declarative '{}' element but is used like a geometry instance via .{} (line {})",
            ident.name, element, member, ident.location.line
        ));
    }
}

/// Element type of a `createElement('<type>', ...)` call.
pub(crate) fn created_element_type(expr: &Expr) -> Option<&str> {
    let Expr::Call {
        callee, arguments, ..
    } = expr
    else {
        return None;
    };
    let is_create_element = match callee.as_ref() {
        Expr::Ident(ident) => ident.name == "createElement",
        Expr::Member {
            object, property, ..
        } => {
            object.as_ident().is_some_and(|ident| ident.name == "React")
                && property.static_name() == Some("createElement")
        }
        _ => false,
    };
    if !is_create_element {
        return None;
    }
    arguments.first()?.as_string_literal()
}

#[cfg(test)]
mod scope_tests {
    use super::*;
    use sg_parser::parse_program;

    fn tree(source: &str) -> ScopeTree {
        build_scope_tree(&parse_program(source).expect("source should parse"))
    }

    #[test]
    fn builds_function_block_and_catch_scopes() {
        let tree = tree(
            "function f(a, { b }, ...c) { let d = a; { const e = d; } try {} catch (err) { err; } }",
        );
        let kinds: Vec<ScopeKind> = tree.scopes.iter().map(|scope| scope.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ScopeKind::Module,
                ScopeKind::Function,
                ScopeKind::Block,
                ScopeKind::Block,
                ScopeKind::Catch
            ]
        );
        let function = &tree.scopes[1];
        assert_eq!(
            function.function_params.iter().cloned().collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert!(function.declarations.contains_key("d"));
        assert!(tree.scopes[4].declarations.contains_key("err"));
        assert!(tree.scopes[4].usages.contains_key("err"));
        assert_eq!(tree.scopes[0].children, vec![1]);
        assert_eq!(tree.ancestors(4).count(), 2);
    }

    #[test]
    fn var_hoists_to_function_scope_and_keeps_first_line() {
        let tree = tree("function f() {\n  if (x) { var v = 1; }\n  var v = 2;\n}");
        let declaration = tree.scopes[1].declarations.get("v").expect("v declared");
        assert!(declaration.hoisted);
        assert_eq!(declaration.location.line, 2);
    }

    #[test]
    fn usages_exclude_targets_keys_and_member_names() {
        let tree = tree("let a; a = b; obj.prop = { key: c, d }; label: for (;;) { break label; } x += 1;");
        let usages: Vec<&str> = tree.scopes[0].usages.keys().map(String::as_str).collect();
        assert_eq!(usages, vec!["b", "c", "d", "obj", "x"]);
    }

    #[test]
    fn warns_on_declarative_geometry_used_imperatively() {
        let tree = tree(
            "const geo = React.createElement('boxGeometry', { args: [1] });\ngeo.computeVertexNormals();\ngeo.computeVertexNormals();\ngeo.key;",
        );
        assert_eq!(tree.category_warnings.len(), 1);
        assert!(tree.category_warnings[0].contains(".computeVertexNormals (line 2)"));
    }
}
