use serde::{Deserialize, Serialize};

use crate::{
    Domain, DomainBuilder, FunctionFlags, OutputType, Result, SearchError, Type, TypedFunction,
    Universe,
};

/// Knobs of the expression search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of push and apply actions per expression.
    pub complexity: usize,
    /// Lets constants and active variables be pushed by the sampler and used
    /// as shortcuts during credit assignment.
    pub extended_leaves: bool,
    /// Not used by the sampling policy, which draws from raw weights.
    pub temperature: f64,
    pub max_sampling_attempts: usize,
    pub max_sampling_failures: usize,
    /// Fixed seed for reproducible sampling; entropy otherwise.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            complexity: 5,
            extended_leaves: false,
            temperature: 5.0,
            max_sampling_attempts: 100,
            max_sampling_failures: 1000,
            seed: None,
        }
    }
}

impl SearchConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let res: Self = serde_json::from_str(json)?;
        res.validate()?;
        Ok(res)
    }

    pub fn validate(&self) -> Result<()> {
        if self.complexity == 0 {
            return Err(SearchError::Config("complexity must be positive".to_string()));
        }
        if self.max_sampling_attempts == 0 {
            return Err(SearchError::Config(
                "max_sampling_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantSpec {
    pub literal: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// `"Int"` or `{ "same_as_input": 0 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputSpec {
    Named(String),
    SameAsInput { same_as_input: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub inputs: Vec<String>,
    pub output: OutputSpec,
    #[serde(default)]
    pub flags: FunctionFlags,
}

/// A declarative domain, loadable from JSON.
///
/// Every type mentioned by an input, constant, function or target must be
/// declared in `types`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSpec {
    pub types: Vec<TypeSpec>,
    pub inputs: Vec<InputSpec>,
    pub constants: Vec<ConstantSpec>,
    pub functions: Vec<FunctionSpec>,
    pub targets: Vec<String>,
}

impl DomainSpec {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Interns the types and leaves of the domain in `universe` and builds
    /// the `Domain`.
    pub fn build(&self, universe: &mut Universe) -> Result<Domain> {
        for t in &self.types {
            universe.intern_type(&t.name);
        }
        let lookup = |universe: &Universe, name: &str| -> Result<Type> {
            match universe.get_type(name) {
                Some(ty) if self.types.iter().any(|t| t.name == name) => Ok(ty),
                _ => Err(SearchError::UnknownType(name.to_string())),
            }
        };

        let mut builder = DomainBuilder::new();
        for t in &self.types {
            if let Some(parent) = &t.parent {
                let child = lookup(universe, &t.name)?;
                builder = builder.parent(child, lookup(universe, parent)?);
            }
        }
        for i in &self.inputs {
            let ty = lookup(universe, &i.ty)?;
            builder = builder.input(universe.input(&i.name, ty));
        }
        for c in &self.constants {
            let ty = lookup(universe, &c.ty)?;
            builder = builder.constant(universe.constant(&c.literal, ty));
        }
        for f in &self.functions {
            let inputs = f
                .inputs
                .iter()
                .map(|t| lookup(universe, t))
                .collect::<Result<Vec<_>>>()?;
            let output = match &f.output {
                OutputSpec::Named(t) => OutputType::Fixed(lookup(universe, t)?),
                OutputSpec::SameAsInput { same_as_input } => OutputType::SameAsInput(*same_as_input),
            };
            builder = builder.function(TypedFunction::new(&f.name, &inputs, output).with_flags(f.flags));
        }
        for t in &self.targets {
            builder = builder.target(lookup(universe, t)?);
        }
        builder.build(universe)
    }
}
