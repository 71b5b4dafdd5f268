//! Lexically scoped name → symbol mapping plus the per-compile registry of
//! class-scope tables.
//!
//! Class tables are chained through their `parent` pointer along the
//! `extends` relation, so a plain `lookup` already sees inherited members.
//! The registry is owned by [`ClassTables`], which the analyzer builds once
//! per compile and the code generator consumes read-only afterwards; there
//! is no global state.

use crate::strtab::Symbol;
use std::{collections::HashMap, rc::Rc};

/// An entry in a symbol table: a variable, field, class reference or method.
///
/// For methods, `ty` equals the return type lexeme and `params` holds the
/// parameter type lexemes in declaration order. For everything else,
/// `params` and `return_type` are unused.
#[derive(Debug, Clone)]
pub struct SymbolDef<'f> {
    pub name: Symbol<'f>,
    pub ty: Symbol<'f>,
    pub is_method: bool,
    pub params: Vec<Symbol<'f>>,
    pub return_type: Option<Symbol<'f>>,
}

impl<'f> SymbolDef<'f> {
    pub fn var(name: Symbol<'f>, ty: Symbol<'f>) -> Self {
        SymbolDef {
            name,
            ty,
            is_method: false,
            params: Vec::new(),
            return_type: None,
        }
    }

    pub fn method(name: Symbol<'f>, params: Vec<Symbol<'f>>, return_type: Symbol<'f>) -> Self {
        SymbolDef {
            name,
            ty: return_type,
            is_method: true,
            params,
            return_type: Some(return_type),
        }
    }
}

/// Returned when a name is added twice to the same scope.
#[derive(Debug)]
pub struct RedefinedSymbol;

/// Returned when a class table is registered twice under the same name.
#[derive(Debug)]
pub struct RedefinedClass;

#[derive(Debug, Default)]
pub struct SymbolTable<'f> {
    symbols: HashMap<Symbol<'f>, SymbolDef<'f>>,
    parent: Option<Rc<SymbolTable<'f>>>,
    /// Set iff this is a class scope.
    class_name: Option<Symbol<'f>>,
    /// Set iff this is a method scope.
    return_type: Option<Symbol<'f>>,
}

impl<'f> SymbolTable<'f> {
    pub fn class_scope(class_name: Symbol<'f>, parent: Option<Rc<SymbolTable<'f>>>) -> Self {
        SymbolTable {
            symbols: HashMap::new(),
            parent,
            class_name: Some(class_name),
            return_type: None,
        }
    }

    pub fn method_scope(parent: Rc<SymbolTable<'f>>, return_type: Symbol<'f>) -> Self {
        SymbolTable {
            symbols: HashMap::new(),
            parent: Some(parent),
            class_name: None,
            return_type: Some(return_type),
        }
    }

    pub fn add_symbol(&mut self, symbol: SymbolDef<'f>) -> Result<(), RedefinedSymbol> {
        use std::collections::hash_map::Entry;
        match self.symbols.entry(symbol.name) {
            Entry::Occupied(_) => Err(RedefinedSymbol),
            Entry::Vacant(entry) => {
                entry.insert(symbol);
                Ok(())
            }
        }
    }

    /// Searches this scope, then its ancestors.
    pub fn lookup(&self, name: Symbol<'f>) -> Option<&SymbolDef<'f>> {
        match self.symbols.get(&name) {
            Some(symbol) => Some(symbol),
            None => self.parent.as_ref().and_then(|parent| parent.lookup(name)),
        }
    }

    /// Searches this scope only.
    pub fn find(&self, name: Symbol<'f>) -> Option<&SymbolDef<'f>> {
        self.symbols.get(&name)
    }

    pub fn parent(&self) -> Option<&Rc<SymbolTable<'f>>> {
        self.parent.as_ref()
    }

    pub fn is_class_scope(&self) -> bool {
        self.class_name.is_some()
    }

    pub fn class_name(&self) -> Option<Symbol<'f>> {
        self.class_name
    }

    pub fn return_type(&self) -> Option<Symbol<'f>> {
        self.return_type
    }

    /// The nearest enclosing class scope, following parent pointers.
    pub fn current_class(&self) -> Option<&SymbolTable<'f>> {
        if self.is_class_scope() {
            Some(self)
        } else {
            self.parent
                .as_ref()
                .and_then(|parent| parent.current_class())
        }
    }
}

/// The per-compile registry mapping class names to their class-scope symbol
/// tables. Populated in topological order by the semantic analyzer and
/// consulted throughout analysis and code generation.
#[derive(Debug, Default)]
pub struct ClassTables<'f> {
    tables: HashMap<Symbol<'f>, Rc<SymbolTable<'f>>>,
}

impl<'f> ClassTables<'f> {
    pub fn new() -> Self {
        ClassTables::default()
    }

    pub fn add(&mut self, name: Symbol<'f>, table: SymbolTable<'f>) -> Result<(), RedefinedClass> {
        use std::collections::hash_map::Entry;
        match self.tables.entry(name) {
            Entry::Occupied(_) => Err(RedefinedClass),
            Entry::Vacant(entry) => {
                entry.insert(Rc::new(table));
                Ok(())
            }
        }
    }

    pub fn get(&self, name: Symbol<'f>) -> Option<&Rc<SymbolTable<'f>>> {
        self.tables.get(&name)
    }

    /// True iff a value of type `from` may stand where `to` is expected:
    /// reflexively, or by walking `from`'s extends chain up to `to`.
    /// Primitive types are equal only to themselves.
    pub fn can_cast(&self, from: Symbol<'f>, to: Symbol<'f>) -> bool {
        if from == to {
            return true;
        }
        let mut table = self.tables.get(&from).map(Rc::as_ref);
        while let Some(current) = table {
            if current.class_name() == Some(to) {
                return true;
            }
            table = current.parent().map(Rc::as_ref);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strtab::StringTable;

    #[test]
    fn lookup_walks_parents_find_does_not() {
        let strtab = StringTable::new();
        let int = strtab.intern("int");

        let mut base = SymbolTable::class_scope(strtab.intern("Base"), None);
        base.add_symbol(SymbolDef::var(strtab.intern("x"), int)).unwrap();

        let mut derived = SymbolTable::class_scope(strtab.intern("Derived"), Some(Rc::new(base)));
        derived
            .add_symbol(SymbolDef::var(strtab.intern("y"), int))
            .unwrap();

        assert!(derived.lookup(strtab.intern("x")).is_some());
        assert!(derived.find(strtab.intern("x")).is_none());
        assert!(derived.find(strtab.intern("y")).is_some());
    }

    #[test]
    fn duplicate_symbol_is_rejected() {
        let strtab = StringTable::new();
        let mut table = SymbolTable::class_scope(strtab.intern("A"), None);
        let def = SymbolDef::var(strtab.intern("x"), strtab.intern("int"));
        assert!(table.add_symbol(def.clone()).is_ok());
        assert!(table.add_symbol(def).is_err());
    }

    fn chain<'f>(strtab: &'f StringTable<'f>) -> ClassTables<'f> {
        // C extends B extends A
        let mut tables = ClassTables::new();
        let a = SymbolTable::class_scope(strtab.intern("A"), None);
        tables.add(strtab.intern("A"), a).unwrap();

        let a_rc = Rc::clone(tables.get(strtab.intern("A")).unwrap());
        let b = SymbolTable::class_scope(strtab.intern("B"), Some(a_rc));
        tables.add(strtab.intern("B"), b).unwrap();

        let b_rc = Rc::clone(tables.get(strtab.intern("B")).unwrap());
        let c = SymbolTable::class_scope(strtab.intern("C"), Some(b_rc));
        tables.add(strtab.intern("C"), c).unwrap();

        tables
    }

    #[test]
    fn can_cast_is_reflexive_and_transitive_upward() {
        let strtab = StringTable::new();
        let tables = chain(&strtab);
        let (a, b, c) = (strtab.intern("A"), strtab.intern("B"), strtab.intern("C"));

        assert!(tables.can_cast(a, a));
        assert!(tables.can_cast(b, a));
        assert!(tables.can_cast(c, a));
        assert!(tables.can_cast(c, b));

        assert!(!tables.can_cast(a, b));
        assert!(!tables.can_cast(a, c));
        assert!(!tables.can_cast(b, c));
    }

    #[test]
    fn primitives_cast_only_to_themselves() {
        let strtab = StringTable::new();
        let tables = chain(&strtab);
        let int = strtab.intern("int");
        let boolean = strtab.intern("boolean");

        assert!(tables.can_cast(int, int));
        assert!(!tables.can_cast(int, boolean));
        assert!(!tables.can_cast(int, strtab.intern("A")));
    }
}
