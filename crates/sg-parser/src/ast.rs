use sg_core::SourceLocation;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Let => "let",
            Self::Const => "const",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub kind: VarKind,
    pub declarators: Vec<VarDeclarator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub id: Option<Ident>,
    pub params: Vec<Pattern>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_arrow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub id: Option<Ident>,
    pub super_class: Option<Box<Expr>>,
    pub members: Vec<ClassMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Method {
        key: PropKey,
        function: Function,
        is_static: bool,
    },
    Field {
        key: PropKey,
        value: Option<Expr>,
        is_static: bool,
    },
    StaticBlock(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub consequent: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Var(VarDecl),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForHead {
    Var(VarKind, Pattern),
    Target(Pattern),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSpecifier {
    pub local: Ident,
    pub exported: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportDecl {
    Declaration(Box<Stmt>),
    DefaultDeclaration(Box<Stmt>),
    DefaultExpr(Expr),
    Named {
        specifiers: Vec<ExportSpecifier>,
        source: Option<String>,
    },
    All {
        source: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub locals: Vec<Ident>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var(VarDecl),
    Function(Function),
    Class(Class),
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        head: ForHead,
        right: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        head: ForHead,
        right: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Return(Option<Expr>),
    Break(Option<Ident>),
    Continue(Option<Ident>),
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Labeled {
        label: Ident,
        body: Box<Stmt>,
    },
    Import(ImportDecl),
    Export(ExportDecl),
    Empty,
    Debugger,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    Regex(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProp {
    Ident(Ident),
    Private(Ident),
    Computed(Box<Expr>),
}

impl MemberProp {
    pub fn static_name(&self) -> Option<&str> {
        match self {
            Self::Ident(ident) => Some(ident.name.as_str()),
            Self::Computed(expr) => match expr.as_ref() {
                Expr::Literal(Literal::String(value)) => Some(value.as_str()),
                _ => None,
            },
            Self::Private(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Ident(String),
    String(String),
    Number(String),
    Private(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    KeyValue { key: PropKey, value: Expr },
    Shorthand { ident: Ident, default: Option<Expr> },
    Method { key: PropKey, function: Function },
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(Ident),
    This,
    Super,
    ImportMeta,
    NewTarget,
    Literal(Literal),
    Template {
        tag: Option<Box<Expr>>,
        quasis: Vec<String>,
        expressions: Vec<Expr>,
    },
    Array(Vec<Option<Expr>>),
    Object(Vec<Prop>),
    Function(Box<Function>),
    Class(Box<Class>),
    Unary {
        op: String,
        argument: Box<Expr>,
    },
    Update {
        op: String,
        prefix: bool,
        argument: Box<Expr>,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: String,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
    },
    Sequence(Vec<Expr>),
    Spread(Box<Expr>),
    Yield(Option<Box<Expr>>),
    Await(Box<Expr>),
    ImportCall(Box<Expr>),
}

impl Expr {
    pub fn as_ident(&self) -> Option<&Ident> {
        match self {
            Self::Ident(ident) => Some(ident),
            _ => None,
        }
    }

    pub fn as_string_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(Literal::String(value)) => Some(value.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectPatternProp {
    KeyValue { key: PropKey, value: Pattern },
    Shorthand { ident: Ident, default: Option<Expr> },
    Rest(Pattern),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(Ident),
    Object(Vec<ObjectPatternProp>),
    Array(Vec<Option<Pattern>>),
    Rest(Box<Pattern>),
    Assign {
        target: Box<Pattern>,
        default: Box<Expr>,
    },
    Expr(Box<Expr>),
}

impl Pattern {
    pub fn bound_names(&self) -> Vec<&Ident> {
        let mut out = Vec::new();
        collect_bound_names(self, &mut out);
        out
    }
}

fn collect_bound_names<'a>(pattern: &'a Pattern, out: &mut Vec<&'a Ident>) {
    match pattern {
        Pattern::Ident(ident) => out.push(ident),
        Pattern::Object(props) => {
            for prop in props {
                match prop {
                    ObjectPatternProp::KeyValue { value, .. } => collect_bound_names(value, out),
                    ObjectPatternProp::Shorthand { ident, .. } => out.push(ident),
                    ObjectPatternProp::Rest(rest) => collect_bound_names(rest, out),
                }
            }
        }
        Pattern::Array(elements) => {
            for element in elements.iter().flatten() {
                collect_bound_names(element, out);
            }
        }
        Pattern::Rest(inner) => collect_bound_names(inner, out),
        Pattern::Assign { target, .. } => collect_bound_names(target, out),
        Pattern::Expr(_) => {}
    }
}
