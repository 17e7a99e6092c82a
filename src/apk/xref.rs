//! Code cross-reference index.
//!
//! Methods are indexed whether they are declared in the package or only invoked from it (platform
//! and library methods), so that a lookup by name finds `queryIntentActivities` even though its
//! body lives in the framework.

use std::collections::HashMap;

use serde_derive::Serialize;

/// Reference to a method.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MethodRef {
    /// Fully qualified class name, in dotted form (`android.content.IntentFilter`).
    pub class_name: String,
    /// Method name.
    pub name: String,
    /// Method descriptor, such as `(Ljava/lang/String;)V`.
    pub descriptor: String,
}

impl MethodRef {
    /// Creates a new method reference.
    pub fn new<C, N, D>(class_name: C, name: N, descriptor: D) -> Self
    where
        C: Into<String>,
        N: Into<String>,
        D: Into<String>,
    {
        Self {
            class_name: class_name.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// `Class->method` representation used in finding detail lines.
    pub fn display_name(&self) -> String {
        format!("{}->{}{}", self.class_name, self.name, self.descriptor)
    }
}

/// Indexed method with its cross references.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    method: MethodRef,
    declared: bool,
    callers: Vec<MethodRef>,
    callees: Vec<MethodRef>,
}

impl MethodEntry {
    /// The referenced method.
    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    /// Whether the method body is part of the package, instead of only being invoked.
    pub fn is_declared(&self) -> bool {
        self.declared
    }

    /// Methods of the package calling this one.
    pub fn callers(&self) -> &[MethodRef] {
        &self.callers
    }

    /// Methods called from this one.
    pub fn callees(&self) -> &[MethodRef] {
        &self.callees
    }
}

/// Call from one method to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite<'i> {
    /// Method performing the call.
    pub caller: &'i MethodRef,
    /// Called method.
    pub callee: &'i MethodRef,
}

/// Location where a string literal is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringRead {
    /// Method loading the literal.
    pub reader: MethodRef,
    /// Register the literal is loaded into.
    pub register: String,
}

/// Indexed string literal with the code locations reading it.
#[derive(Debug, Clone)]
pub struct StringEntry {
    value: String,
    reads: Vec<StringRead>,
}

impl StringEntry {
    /// Literal value.
    pub fn value(&self) -> &str {
        self.value.as_str()
    }

    /// Locations reading the literal.
    pub fn reads(&self) -> &[StringRead] {
        &self.reads
    }
}

/// Cross-reference index of the methods and string literals of a package.
#[derive(Debug, Clone, Default)]
pub struct CodeIndex {
    methods: Vec<MethodEntry>,
    method_positions: HashMap<MethodRef, usize>,
    strings: Vec<StringEntry>,
    string_positions: HashMap<String, usize>,
}

impl CodeIndex {
    /// Creates a builder for the index.
    pub fn builder() -> CodeIndexBuilder {
        CodeIndexBuilder::default()
    }

    /// All the indexed methods, in indexing order.
    pub fn methods(&self) -> &[MethodEntry] {
        &self.methods
    }

    /// Gets the entry of the given method.
    pub fn method(&self, method: &MethodRef) -> Option<&MethodEntry> {
        self.method_positions
            .get(method)
            .map(|&position| &self.methods[position])
    }

    /// Methods with the given name, in any class.
    pub fn methods_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s MethodEntry> {
        self.methods.iter().filter(move |m| m.method.name == name)
    }

    /// Every call to a method with the given name.
    pub fn call_sites_to<'s>(&'s self, name: &'s str) -> Vec<CallSite<'s>> {
        self.methods_named(name)
            .flat_map(|entry| {
                entry.callers.iter().map(move |caller| CallSite {
                    caller,
                    callee: &entry.method,
                })
            })
            .collect()
    }

    /// Methods called from the given method. Empty if the method is not indexed.
    pub fn callees_of(&self, method: &MethodRef) -> &[MethodRef] {
        self.method(method).map(MethodEntry::callees).unwrap_or(&[])
    }

    /// All the indexed string literals, in indexing order.
    pub fn strings(&self) -> &[StringEntry] {
        &self.strings
    }

    /// Locations reading the given literal. Empty if the literal is never loaded.
    pub fn string_reads(&self, value: &str) -> &[StringRead] {
        self.string_positions
            .get(value)
            .map(|&position| self.strings[position].reads())
            .unwrap_or(&[])
    }
}

/// Builder of the code index.
#[derive(Debug, Default)]
pub struct CodeIndexBuilder {
    index: CodeIndex,
}

impl CodeIndexBuilder {
    fn entry(&mut self, method: &MethodRef) -> &mut MethodEntry {
        let index = &mut self.index;
        let position = match index.method_positions.get(method) {
            Some(&position) => position,
            None => {
                index.methods.push(MethodEntry {
                    method: method.clone(),
                    declared: false,
                    callers: Vec::new(),
                    callees: Vec::new(),
                });
                let position = index.methods.len() - 1;
                let _ = index.method_positions.insert(method.clone(), position);
                position
            }
        };
        &mut index.methods[position]
    }

    /// Declares a method whose body is part of the package.
    pub fn declare_method(&mut self, method: &MethodRef) -> &mut Self {
        self.entry(method).declared = true;
        self
    }

    /// Records a call. Repeated calls between the same pair of methods are recorded once.
    pub fn add_call(&mut self, caller: &MethodRef, callee: &MethodRef) -> &mut Self {
        {
            let caller_entry = self.entry(caller);
            if !caller_entry.callees.contains(callee) {
                caller_entry.callees.push(callee.clone());
            }
        }
        let callee_entry = self.entry(callee);
        if !callee_entry.callers.contains(caller) {
            callee_entry.callers.push(caller.clone());
        }
        self
    }

    /// Records a load of a string literal.
    pub fn add_string_read<S: Into<String>, R: Into<String>>(
        &mut self,
        value: S,
        reader: &MethodRef,
        register: R,
    ) -> &mut Self {
        let value = value.into();
        let read = StringRead {
            reader: reader.clone(),
            register: register.into(),
        };
        let index = &mut self.index;
        match index.string_positions.get(&value) {
            Some(&position) => {
                let entry = &mut index.strings[position];
                if !entry.reads.contains(&read) {
                    entry.reads.push(read);
                }
            }
            None => {
                let _ = index
                    .string_positions
                    .insert(value.clone(), index.strings.len());
                index.strings.push(StringEntry {
                    value,
                    reads: vec![read],
                });
            }
        }
        self
    }

    /// Finishes the index.
    pub fn build(self) -> CodeIndex {
        self.index
    }
}
