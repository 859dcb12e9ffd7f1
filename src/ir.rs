//! IR and diagnostics for the Ripple reactivity analyzer.
//!
//! The analyzer assigns every reactive entity (state, derived value, prop) a
//! single-bit id, prunes entities nothing observes, and annotates the IR with
//! "wave" bitmasks: for each surviving id, the set of downstream computations
//! that must re-run when it changes. Codegen turns those masks into literal
//! bitwise update guards.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_INVALID_PROP_TARGET: &str = "R-ERR-PROP-001";
pub const ERR_VIEW_SCOPE_KIND: &str = "R-ERR-SCOPE-001";
pub const ERR_HOOK_RETURN_SCOPE_KIND: &str = "R-ERR-SCOPE-002";
pub const ERR_UNBALANCED_SUB_COMPONENT: &str = "R-ERR-SCOPE-003";
pub const ERR_ID_SPACE_EXHAUSTED: &str = "R-ERR-CAP-001";
pub const ERR_MISSING_WAVE_BIT: &str = "R-ERR-WAVE-001";
pub const ERR_EXPRESSION_SYNTAX: &str = "R-ERR-SYNTAX-001";
pub const ERR_INVALID_INPUT: &str = "R-ERR-INPUT-001";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_INVALID_PROP_TARGET => "Prop values are valid assignable targets.",
        ERR_VIEW_SCOPE_KIND => "Only component scopes return a view.",
        ERR_HOOK_RETURN_SCOPE_KIND => "Only hook scopes return a hook value.",
        ERR_UNBALANCED_SUB_COMPONENT => {
            "Every sub-component scope is closed by the builder that opened it."
        }
        ERR_ID_SPACE_EXHAUSTED => {
            "Every reactive entity owns a distinct power-of-two bit within one component tree."
        }
        ERR_MISSING_WAVE_BIT => {
            "Every id referenced by a surviving dependency has a wave bit after pruning."
        }
        ERR_EXPRESSION_SYNTAX => "Declaration expressions parse as TSX.",
        ERR_INVALID_INPUT => "Declaration requests arrive as well-formed JSON.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Error taxonomy. `UserInput` aborts the offending component but lets
/// siblings continue; `Capacity` is fatal for the component being analyzed;
/// `InternalConsistency` signals a bug in the pruning/propagation invariants
/// and is never swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    UserInput,
    Capacity,
    InternalConsistency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompilerError {
    pub code: String,
    pub kind: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, kind: ErrorKind, message: &str, file: &str, loc: SourceLocation) -> Self {
        Self::with_hints(code, kind, message, file, loc, vec![])
    }

    pub fn with_hints(
        code: &str,
        kind: ErrorKind,
        message: &str,
        file: &str,
        loc: SourceLocation,
        hints: Vec<String>,
    ) -> Self {
        let kind = match kind {
            ErrorKind::UserInput => "USER_INPUT",
            ErrorKind::Capacity => "CAPACITY",
            ErrorKind::InternalConsistency => "INTERNAL_CONSISTENCY",
        };
        CompilerError {
            code: code.to_string(),
            kind: kind.to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            line: loc.line,
            column: loc.column,
            hints,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind == "INTERNAL_CONSISTENCY"
    }
}

impl std::fmt::Display for CompilerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({}:{}:{})",
            self.code, self.message, self.file, self.line, self.column
        )
    }
}

impl std::error::Error for CompilerError {}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE HANDLES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// Opaque source-expression handle. The analyzer never inspects the snippet
/// itself; only the extractor, pattern, and view collaborators parse it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExprSource {
    pub code: String,
    #[serde(default)]
    pub loc: SourceLocation,
}

impl ExprSource {
    pub fn new(code: impl Into<String>) -> Self {
        ExprSource {
            code: code.into(),
            loc: SourceLocation::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEPENDENCY
// ═══════════════════════════════════════════════════════════════════════════════

/// Output of the dependency extractor: the reactive ids an expression reads,
/// as a bitmap, plus the referenced names in source order (deduplicated).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub dep_id_bitmap: u64,
    pub source_names: Vec<String>,
}

/// Decompose a bitmap into its individual set bits.
pub fn bitmap_to_bits(bitmap: u64) -> Vec<u64> {
    let mut bits = Vec::new();
    let mut rest = bitmap;
    while rest != 0 {
        let low = rest & rest.wrapping_neg();
        bits.push(low);
        rest ^= low;
    }
    bits
}

// ═══════════════════════════════════════════════════════════════════════════════
// IR STATEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropsSource {
    #[default]
    Param,
    Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DerivedSource {
    State,
    Hook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecyclePhase {
    WillMount,
    DidMount,
    WillUnmount,
    DidUnmount,
}

impl LifecyclePhase {
    /// Runtime registration method name.
    pub fn method(&self) -> &'static str {
        match self {
            LifecyclePhase::WillMount => "willMount",
            LifecyclePhase::DidMount => "didMount",
            LifecyclePhase::WillUnmount => "willUnmount",
            LifecyclePhase::DidUnmount => "didUnmount",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStmt {
    /// Leaf names bound by the declaration pattern; more than one when the
    /// pattern destructures, all sharing `reactive_id`.
    pub names: Vec<String>,
    pub lval: String,
    pub reactive_id: u64,
    pub init: Option<ExprSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedStmt {
    pub names: Vec<String>,
    pub lval: String,
    pub reactive_id: u64,
    pub value: ExprSource,
    pub source: DerivedSource,
    pub dependency: Option<Dependency>,
    /// Per-argument dependencies of a hook invocation; empty for plain
    /// derived state.
    #[serde(default)]
    pub hook_arg_dependencies: Vec<Option<Dependency>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinglePropStmt {
    pub name: String,
    pub value: String,
    pub reactive_id: u64,
    pub is_destructured: bool,
    pub default_value: Option<ExprSource>,
    pub source: PropsSource,
    pub ctx_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestPropStmt {
    pub name: String,
    pub reactive_id: u64,
    pub source: PropsSource,
    pub ctx_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WholePropStmt {
    pub name: String,
    pub value: String,
    pub reactive_id: u64,
    pub source: PropsSource,
    pub ctx_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStmt {
    pub callback: ExprSource,
    pub dependency: Option<Dependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleStmt {
    pub callback: ExprSource,
    pub phase: LifecyclePhase,
    pub dependency: Option<Dependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewReturnStmt {
    pub particle: ViewParticle,
    pub used_id_bits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseContextStmt {
    pub names: Vec<String>,
    pub lval: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookReturnStmt {
    pub value: ExprSource,
    pub dependency: Option<Dependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubCompStmt {
    pub name: String,
    pub block: BlockId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IRStmt {
    Raw { code: String },
    State(StateStmt),
    Derived(DerivedStmt),
    SingleProp(SinglePropStmt),
    RestProp(RestPropStmt),
    WholeProp(WholePropStmt),
    Watch(WatchStmt),
    Lifecycle(LifecycleStmt),
    ViewReturn(ViewReturnStmt),
    UseContext(UseContextStmt),
    HookReturn(HookReturnStmt),
    SubComp(SubCompStmt),
}

impl IRStmt {
    /// The single-bit id of a reactive declaration, if this statement is one.
    pub fn reactive_id(&self) -> Option<u64> {
        match self {
            IRStmt::State(s) => Some(s.reactive_id),
            IRStmt::Derived(s) => Some(s.reactive_id),
            IRStmt::SingleProp(s) => Some(s.reactive_id),
            IRStmt::RestProp(s) => Some(s.reactive_id),
            IRStmt::WholeProp(s) => Some(s.reactive_id),
            _ => None,
        }
    }

    pub fn is_prop(&self) -> bool {
        matches!(
            self,
            IRStmt::SingleProp(_) | IRStmt::RestProp(_) | IRStmt::WholeProp(_)
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE TREE (IR BLOCK ARENA)
// ═══════════════════════════════════════════════════════════════════════════════

/// Index into `IRRoot::blocks`. Blocks never move or disappear, so ids stay
/// valid for the lifetime of the tree.
pub type BlockId = usize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
    #[default]
    Component,
    Hook,
    Class,
}

impl BlockKind {
    /// Component and class scopes both terminate in a view; hooks terminate
    /// in a return value.
    pub fn has_view(&self) -> bool {
        matches!(self, BlockKind::Component | BlockKind::Class)
    }
}

/// One lexical unit: a component, hook body, or class body. The parent link
/// is a non-owning back-reference used only for lexical lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IRBlock {
    pub name: String,
    pub kind: BlockKind,
    pub body: Vec<IRStmt>,
    pub parent: Option<BlockId>,
    /// Reactive ids declared in this scope. Names are unique per scope; a
    /// name maps to a new id only through an explicit destructuring share.
    pub reactive_map: HashMap<String, u64>,
    /// Union of every reactive id referenced by statements in this scope,
    /// plus the bits folded up from finished sub-components.
    pub used_id_bits: u64,
}

impl IRBlock {
    pub fn new(name: &str, kind: BlockKind, parent: Option<BlockId>) -> Self {
        IRBlock {
            name: name.to_string(),
            kind,
            body: Vec::new(),
            parent,
            reactive_map: HashMap::new(),
            used_id_bits: 0,
        }
    }
}

/// The finished scope tree: an arena of blocks with `root` as the entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IRRoot {
    pub blocks: Vec<IRBlock>,
    pub root: BlockId,
}

impl IRRoot {
    pub fn block(&self, id: BlockId) -> &IRBlock {
        &self.blocks[id]
    }

    /// Resolve a name against a block and its ancestors; nearest scope wins.
    pub fn resolve_reactive(&self, from: BlockId, name: &str) -> Option<u64> {
        let mut current = Some(from);
        while let Some(id) = current {
            let block = &self.blocks[id];
            if let Some(&bit) = block.reactive_map.get(name) {
                return Some(bit);
            }
            current = block.parent;
        }
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VIEW PARTICLES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Static(String),
    Dynamic {
        expr: ExprSource,
        #[serde(default)]
        dep_id_bitmap: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticleAttr {
    pub name: String,
    pub value: AttrValue,
}

/// Renderable output of the view parser. Kept deliberately small: codegen
/// only needs structure, expression handles, and per-expression dep bitmaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ViewParticle {
    Element {
        tag: String,
        attributes: Vec<ParticleAttr>,
        children: Vec<ViewParticle>,
    },
    Text {
        value: String,
    },
    Expression {
        expr: ExprSource,
        dep_id_bitmap: u64,
    },
    Component {
        name: String,
        attributes: Vec<ParticleAttr>,
        children: Vec<ViewParticle>,
    },
    Fragment {
        children: Vec<ViewParticle>,
    },
}
