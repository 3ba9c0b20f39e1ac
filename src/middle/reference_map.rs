//! The binding of every path to the declaration it denotes, and the registry
//! of names already in use.
//!
//! The map is flat: scoping is applied once, by name resolution, and lookups
//! afterwards go straight from a path's id to its declaration. Any pass that
//! introduces declarations whose names could clash, or that moves code across
//! scopes, must be followed by another resolution run.

use std::rc::Rc;

use hashbrown::{HashMap, HashSet};
use once_cell::sync::Lazy;

use crate::{
    diagnostics::CompilerBug,
    ir::{build, Declaration, DeclarationKind, NodeId, Path, Symbol},
};

const RESERVED_WORDS: &[&str] = &[
    "abstract",
    "action",
    "actions",
    "apply",
    "bit",
    "bool",
    "const",
    "control",
    "default",
    "else",
    "entries",
    "enum",
    "error",
    "exit",
    "extern",
    "false",
    "header",
    "header_union",
    "if",
    "in",
    "inout",
    "int",
    "key",
    "list",
    "match_kind",
    "out",
    "package",
    "parser",
    "return",
    "select",
    "state",
    "string",
    "struct",
    "switch",
    "table",
    "this",
    "transition",
    "true",
    "tuple",
    "type",
    "typedef",
    "value_set",
    "varbit",
    "void",
];

static RESERVED_SYMBOLS: Lazy<Vec<Symbol>> =
    Lazy::new(|| RESERVED_WORDS.iter().map(|word| Symbol::new(word)).collect());

pub fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

#[derive(Debug)]
pub struct ReferenceMap {
    paths: HashMap<NodeId, Rc<Declaration>>,
    /// `this` expressions, bound to the instance they occur in
    this_references: HashMap<NodeId, Rc<Declaration>>,
    used_names: HashSet<Symbol>,
    accept: Rc<Declaration>,
    reject: Rc<Declaration>,
}

impl Default for ReferenceMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceMap {
    pub fn new() -> Self {
        let mut map = Self {
            paths: HashMap::new(),
            this_references: HashMap::new(),
            used_names: HashSet::new(),
            accept: built_in_state("accept"),
            reject: built_in_state("reject"),
        };
        map.seed_reserved_words();
        map
    }

    fn seed_reserved_words(&mut self) {
        self.used_names.extend(RESERVED_SYMBOLS.iter().copied());
    }

    /// Forgets every binding and every used name. The built-in parser states
    /// keep their identity.
    pub fn clear(&mut self) {
        log::trace!("clearing {} path bindings", self.paths.len());
        self.paths.clear();
        self.this_references.clear();
        self.used_names.clear();
        self.seed_reserved_words();
    }

    /// The built-in `accept` parser state
    pub fn accept_state(&self) -> &Rc<Declaration> {
        &self.accept
    }

    /// The built-in `reject` parser state
    pub fn reject_state(&self) -> &Rc<Declaration> {
        &self.reject
    }

    pub fn set_declaration(
        &mut self,
        path: &Path,
        declaration: &Rc<Declaration>,
    ) -> Result<(), CompilerBug> {
        if let Some(existing) = self.paths.get(&path.id) {
            if !Rc::ptr_eq(existing, declaration) {
                return Err(CompilerBug::ConflictingBinding {
                    name: path.name.symbol,
                    path: path.id,
                    existing: existing.id,
                    new: declaration.id,
                });
            }
            return Ok(());
        }

        self.paths.insert(path.id, declaration.clone());
        self.used_names.insert(path.name.symbol);
        Ok(())
    }

    /// The declaration `path` was bound to, if resolution bound it
    pub fn get_declaration(&self, path: &Path) -> Option<&Rc<Declaration>> {
        self.paths.get(&path.id)
    }

    /// The declaration `path` was bound to. Every path in a resolved program
    /// has a binding, so a missing one is a compiler bug.
    pub fn require_declaration(&self, path: &Path) -> Result<&Rc<Declaration>, CompilerBug> {
        self.paths.get(&path.id).ok_or(CompilerBug::Unresolved {
            name: path.name.symbol,
            path: path.id,
        })
    }

    pub fn set_this(&mut self, this: NodeId, instance: &Rc<Declaration>) {
        self.this_references.insert(this, instance.clone());
    }

    pub fn get_this(&self, this: NodeId) -> Option<&Rc<Declaration>> {
        self.this_references.get(&this)
    }

    pub fn use_name(&mut self, name: Symbol) {
        self.used_names.insert(name);
    }

    pub fn is_used(&self, name: Symbol) -> bool {
        self.used_names.contains(&name)
    }

    /// A name no declaration uses yet, derived from `base`. A numeric suffix
    /// left by an earlier renaming is dropped first so that suffixes do not
    /// pile up.
    pub fn new_name(&mut self, base: &str) -> Symbol {
        let stem = strip_numeric_suffix(base);

        let candidate = Symbol::new(stem);
        if !self.used_names.contains(&candidate) {
            self.used_names.insert(candidate);
            return candidate;
        }

        let mut counter = 0usize;
        loop {
            let candidate = Symbol::new(&format!("{stem}_{counter}"));
            if self.used_names.insert(candidate) {
                log::trace!("generated name `{candidate}` from `{base}`");
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn built_in_state(name: &str) -> Rc<Declaration> {
    build::declaration(
        name,
        DeclarationKind::ParserState {
            components: Rc::from(Vec::new()),
            selection: None,
        },
    )
}

/// `tmp_12` becomes `tmp`; names without a numeric suffix are kept
fn strip_numeric_suffix(name: &str) -> &str {
    match name.rsplit_once('_') {
        Some((stem, digits))
            if !stem.is_empty()
                && !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            stem
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::variable;

    #[test]
    fn rebinding_to_another_declaration_is_a_bug() {
        let mut map = ReferenceMap::new();
        let path = Path::new("x");
        let first = variable("x", build::bits(8), None);
        let second = variable("x", build::bits(8), None);

        assert_eq!(map.set_declaration(&path, &first), Ok(()));
        assert_eq!(map.set_declaration(&path, &first), Ok(()));
        assert!(matches!(
            map.set_declaration(&path, &second),
            Err(CompilerBug::ConflictingBinding { .. })
        ));
        assert!(Rc::ptr_eq(map.require_declaration(&path).unwrap(), &first));
    }

    #[test]
    fn missing_binding_is_absent_or_a_bug() {
        let map = ReferenceMap::new();
        let path = Path::new("y");

        assert!(map.get_declaration(&path).is_none());
        assert!(matches!(
            map.require_declaration(&path),
            Err(CompilerBug::Unresolved { .. })
        ));
    }

    #[test]
    fn new_names_are_distinct_and_avoid_reserved_words() {
        let mut map = ReferenceMap::new();
        map.use_name(Symbol::new("tmp"));

        let names = (0..50)
            .map(|i| map.new_name(if i % 2 == 0 { "tmp" } else { "tmp_7" }))
            .collect::<Vec<_>>();

        let unique = names.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), names.len());
        assert!(!names.contains(&Symbol::new("tmp")));
        assert_eq!(names[0], Symbol::new("tmp_0"));
        assert_eq!(names[1], Symbol::new("tmp_1"));

        let state = map.new_name("state");
        assert_ne!(state, Symbol::new("state"));
        assert_eq!(state, Symbol::new("state_0"));
    }

    #[test]
    fn fresh_base_is_used_as_is() {
        let mut map = ReferenceMap::new();
        assert_eq!(map.new_name("s0_join"), Symbol::new("s0_join"));
        assert_eq!(map.new_name("s0_join"), Symbol::new("s0_join_0"));
    }

    #[test]
    fn suffix_stripping() {
        assert_eq!(strip_numeric_suffix("tmp_12"), "tmp");
        assert_eq!(strip_numeric_suffix("tmp_a"), "tmp_a");
        assert_eq!(strip_numeric_suffix("_3"), "_3");
        assert_eq!(strip_numeric_suffix("s0_join"), "s0_join");
    }

    #[test]
    fn clear_forgets_bindings_but_keeps_reserved_words() {
        let mut map = ReferenceMap::new();
        let path = Path::new("x");
        map.set_declaration(&path, &variable("x", build::bits(8), None))
            .unwrap();
        assert!(map.is_used(Symbol::new("x")));

        map.clear();
        assert!(map.is_empty());
        assert!(!map.is_used(Symbol::new("x")));
        assert!(map.is_used(Symbol::new("apply")));
    }
}
