//! The analyzed specification handed to the evaluator. Parsing and semantic
//! analysis happen elsewhere; their output arrives either as a JSON document
//! (see [`load_file`]) or is assembled programmatically with [`SpecBuilder`].

use crate::error::LoadError;
use crate::eval::State;
use crate::syntax::{Expr, OperatorDef};
use crate::value::Value;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: Arc<str>,
    pub path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Spec {
    root: Arc<str>,
    modules: Vec<Module>,
    operators: BTreeMap<Arc<str>, Arc<OperatorDef>>,
    assumptions: Vec<Expr>,
    constants: Vec<(Arc<str>, Value)>,
    variables: Arc<[Arc<str>]>,
    init: Option<Arc<str>>,
    next: Option<Arc<str>>,
    invariants: Vec<Arc<str>>,
    trace: Vec<Arc<State>>,
}

impl Spec {
    pub fn builder(root: &str) -> SpecBuilder {
        SpecBuilder::new(root)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| &*m.name == name)
    }

    pub fn operator(&self, name: &str) -> Option<&Arc<OperatorDef>> {
        self.operators.get(name)
    }

    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, v)| v)
    }

    /// Constants in declaration order.
    pub fn constants(&self) -> &[(Arc<str>, Value)] {
        &self.constants
    }

    pub fn variables(&self) -> &Arc<[Arc<str>]> {
        &self.variables
    }

    pub fn assumptions(&self) -> &[Expr] {
        &self.assumptions
    }

    pub fn init(&self) -> Option<&str> {
        self.init.as_deref()
    }

    pub fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }

    pub fn invariants(&self) -> &[Arc<str>] {
        &self.invariants
    }

    pub fn trace(&self) -> &[Arc<State>] {
        &self.trace
    }
}

pub struct SpecBuilder {
    root: Arc<str>,
    modules: Vec<Module>,
    operators: Vec<OperatorDef>,
    assumptions: Vec<Expr>,
    constants: Vec<(Arc<str>, Value)>,
    variables: Vec<Arc<str>>,
    init: Option<Arc<str>>,
    next: Option<Arc<str>>,
    invariants: Vec<Arc<str>>,
    trace: Vec<Vec<(Arc<str>, Value)>>,
}

impl SpecBuilder {
    pub fn new(root: &str) -> Self {
        Self {
            root: Arc::from(root),
            modules: vec![Module {
                name: Arc::from(root),
                path: None,
            }],
            operators: Vec::new(),
            assumptions: Vec::new(),
            constants: Vec::new(),
            variables: Vec::new(),
            init: None,
            next: None,
            invariants: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn module(mut self, name: &str, path: Option<PathBuf>) -> Self {
        match self.modules.iter_mut().find(|m| &*m.name == name) {
            Some(existing) => existing.path = path.or(existing.path.take()),
            None => self.modules.push(Module {
                name: Arc::from(name),
                path,
            }),
        }
        self
    }

    pub fn operator(mut self, def: OperatorDef) -> Self {
        self.operators.push(def);
        self
    }

    pub fn assume(mut self, expr: Expr) -> Self {
        self.assumptions.push(expr);
        self
    }

    pub fn constant(mut self, name: &str, value: Value) -> Self {
        self.constants.push((Arc::from(name), value));
        self
    }

    pub fn variables(mut self, names: &[&str]) -> Self {
        self.variables = names.iter().map(|n| Arc::from(*n)).collect();
        self
    }

    pub fn init(mut self, name: &str) -> Self {
        self.init = Some(Arc::from(name));
        self
    }

    pub fn next(mut self, name: &str) -> Self {
        self.next = Some(Arc::from(name));
        self
    }

    pub fn invariant(mut self, name: &str) -> Self {
        self.invariants.push(Arc::from(name));
        self
    }

    pub fn state<'a>(mut self, bindings: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        self.trace
            .push(bindings.into_iter().map(|(n, v)| (Arc::from(n), v)).collect());
        self
    }

    pub fn build(self) -> Result<Spec, LoadError> {
        let mut operators = BTreeMap::new();
        for def in self.operators {
            if !self.modules.iter().any(|m| m.name == def.location.module) {
                return Err(LoadError::UnknownModule(def.location.module.to_string()));
            }
            let name = def.name.clone();
            if operators.insert(name.clone(), Arc::new(def)).is_some() {
                return Err(LoadError::DuplicateOperator(name.to_string()));
            }
        }

        for referenced in self
            .init
            .iter()
            .chain(self.next.iter())
            .chain(self.invariants.iter())
        {
            if !operators.contains_key(referenced) {
                return Err(LoadError::UnknownOperator(referenced.to_string()));
            }
        }

        let variables: Arc<[Arc<str>]> = self.variables.into();
        let mut trace = Vec::with_capacity(self.trace.len());
        for (index, bindings) in self.trace.into_iter().enumerate() {
            let mut values = Vec::with_capacity(variables.len());
            for variable in variables.iter() {
                let value = bindings
                    .iter()
                    .find(|(n, _)| n == variable)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| LoadError::IncompleteState {
                        index,
                        variable: variable.to_string(),
                    })?;
                values.push(value);
            }
            trace.push(Arc::new(State::new(Arc::clone(&variables), values)));
        }

        debug!(
            root = %self.root,
            operators = operators.len(),
            states = trace.len(),
            "spec assembled"
        );

        Ok(Spec {
            root: self.root,
            modules: self.modules,
            operators,
            assumptions: self.assumptions,
            constants: self.constants,
            variables,
            init: self.init,
            next: self.next,
            invariants: self.invariants,
            trace,
        })
    }
}

/// On-disk form produced by the external parser/analyzer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecDocument {
    root: String,
    modules: Vec<ModuleDocument>,
    #[serde(default)]
    constants: Vec<ConstantDocument>,
    #[serde(default)]
    variables: Vec<String>,
    #[serde(default)]
    init: Option<String>,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    invariants: Vec<String>,
    #[serde(default)]
    trace: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ModuleDocument {
    name: String,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    operators: Vec<OperatorDef>,
    #[serde(default)]
    assumptions: Vec<Expr>,
}

#[derive(Debug, Deserialize)]
struct ConstantDocument {
    name: String,
    value: serde_json::Value,
}

pub fn load_str(json: &str) -> Result<Spec, LoadError> {
    let doc: SpecDocument = serde_json::from_str(json)?;

    if !doc.modules.iter().any(|m| m.name == doc.root) {
        return Err(LoadError::UnknownModule(doc.root));
    }

    let mut builder = SpecBuilder::new(&doc.root);
    for module in doc.modules {
        builder = builder.module(&module.name, module.path);
        for def in module.operators {
            builder = builder.operator(def);
        }
        for assumption in module.assumptions {
            builder = builder.assume(assumption);
        }
    }

    for constant in doc.constants {
        let value = Value::from_json(&constant.value).map_err(|reason| LoadError::InvalidValue {
            name: constant.name.clone(),
            reason,
        })?;
        builder = builder.constant(&constant.name, value);
    }

    let variables: Vec<&str> = doc.variables.iter().map(String::as_str).collect();
    builder = builder.variables(&variables);
    if let Some(init) = &doc.init {
        builder = builder.init(init);
    }
    if let Some(next) = &doc.next {
        builder = builder.next(next);
    }
    for invariant in &doc.invariants {
        builder = builder.invariant(invariant);
    }

    for state in &doc.trace {
        let mut bindings = Vec::with_capacity(state.len());
        for (name, json) in state {
            let value = Value::from_json(json).map_err(|reason| LoadError::InvalidValue {
                name: name.clone(),
                reason,
            })?;
            bindings.push((name.as_str(), value));
        }
        builder = builder.state(bindings);
    }

    builder.build()
}

pub fn load_file(path: &Path) -> Result<Spec, LoadError> {
    let contents = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let spec = load_str(&contents)?;
    info!(path = %path.display(), root = spec.root(), "loaded spec document");
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::build;

    #[test]
    fn test_rejects_duplicate_operators() {
        let at = build::line("Main", 3);
        let result = Spec::builder("Main")
            .operator(build::def(&at, "Op", &[], build::int(&at, 1)))
            .operator(build::def(&at, "Op", &[], build::int(&at, 2)))
            .build();
        assert!(matches!(result, Err(LoadError::DuplicateOperator(name)) if name == "Op"));
    }

    #[test]
    fn test_states_must_bind_every_variable() {
        let result = Spec::builder("Main")
            .variables(&["x", "y"])
            .state([("x", Value::Int(1))])
            .build();
        assert!(matches!(
            result,
            Err(LoadError::IncompleteState { index: 0, ref variable }) if variable == "y"
        ));
    }

    #[test]
    fn test_loads_document() {
        let json = r#"{
            "root": "Main",
            "modules": [{
                "name": "Main",
                "path": "specs/Main.tla",
                "operators": [{
                    "name": "Init",
                    "location": {"module": "Main", "begin": {"line": 5, "column": 1}, "end": {"line": 5, "column": 12}},
                    "body": {
                        "location": {"module": "Main", "begin": {"line": 5, "column": 9}, "end": {"line": 5, "column": 12}},
                        "kind": "apply", "op": "=",
                        "args": [
                            {"location": {"module": "Main", "begin": {"line": 5, "column": 9}, "end": {"line": 5, "column": 9}}, "kind": "name", "name": "x"},
                            {"location": {"module": "Main", "begin": {"line": 5, "column": 11}, "end": {"line": 5, "column": 11}}, "kind": "int", "value": 0}
                        ]
                    }
                }]
            }],
            "constants": [{"name": "N", "value": 3}],
            "variables": ["x"],
            "init": "Init",
            "trace": [{"x": 0}]
        }"#;
        let spec = load_str(json).unwrap();
        assert_eq!(spec.root(), "Main");
        assert_eq!(spec.constant("N"), Some(&Value::Int(3)));
        assert_eq!(spec.trace().len(), 1);
        assert_eq!(spec.operator("Init").unwrap().to_string(), "Init == x = 0");
        assert_eq!(
            spec.module("Main").unwrap().path.as_deref(),
            Some(Path::new("specs/Main.tla"))
        );
    }

    #[test]
    fn test_unknown_root_module() {
        let err = load_str(r#"{"root": "Nope", "modules": []}"#).unwrap_err();
        assert!(matches!(err, LoadError::UnknownModule(m) if m == "Nope"));
    }
}
