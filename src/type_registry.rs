use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::consistency::CheckSpec;
use crate::field_mapping::{FieldMapping, MappingType};
use crate::rules::{Rule, RuleKind};
use crate::schema::{SchemaError, StructuralSchema};
use crate::validation::Phase;

const COMMON_FILE: &str = "common.yaml";

/// The TypeSpecs shipped with the tool.
const BUILTIN: &[(&str, &str)] = &[
    ("mcq.yaml", include_str!("../type_specs/mcq.yaml")),
    ("mrq.yaml", include_str!("../type_specs/mrq.yaml")),
    ("opinion.yaml", include_str!("../type_specs/opinion.yaml")),
    ("oq.yaml", include_str!("../type_specs/oq.yaml")),
    ("matching.yaml", include_str!("../type_specs/matching.yaml")),
    ("counting.yaml", include_str!("../type_specs/counting.yaml")),
    ("frq.yaml", include_str!("../type_specs/frq.yaml")),
    ("string.yaml", include_str!("../type_specs/string.yaml")),
    ("gapText.yaml", include_str!("../type_specs/gapText.yaml")),
    ("puzzle.yaml", include_str!("../type_specs/puzzle.yaml")),
    ("input_box.yaml", include_str!("../type_specs/input_box.yaml")),
];

const BUILTIN_COMMON: &str = include_str!("../type_specs/common.yaml");

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read type specs from '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("'{name}': {phase} schema: {source}")]
    Schema {
        name: String,
        phase: Phase,
        #[source]
        source: SchemaError,
    },

    #[error("Rule validation failed in '{name}': {reason}")]
    RuleValidationFailed { name: String, reason: String },

    #[error("Type discriminator '{0}' is declared more than once")]
    DuplicateType(String),

    #[error("No type specs found in '{0}'")]
    Empty(String),
}

/// Per-type bundle of legacy schema, target schema and transformation rule.
pub struct TypeSpec {
    discriminator: String,
    aliases: Vec<String>,
    legacy: StructuralSchema,
    target: StructuralSchema,
    rule: Arc<dyn Rule>,
}

impl fmt::Debug for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSpec")
            .field("discriminator", &self.discriminator)
            .field("aliases", &self.aliases)
            .field("rule", &self.rule.kind())
            .finish()
    }
}

impl TypeSpec {
    pub fn new(
        discriminator: impl Into<String>,
        legacy: StructuralSchema,
        target: StructuralSchema,
        rule: Arc<dyn Rule>,
    ) -> Self {
        Self {
            discriminator: discriminator.into(),
            aliases: Vec::new(),
            legacy,
            target,
            rule,
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn rule(&self) -> &dyn Rule {
        self.rule.as_ref()
    }

    /// Legacy schema for `Pre`, target schema for `Post`.
    pub fn schema(&self, phase: Phase) -> &StructuralSchema {
        match phase {
            Phase::Pre => &self.legacy,
            Phase::Post => &self.target,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaFile {
    schema: Value,
    #[serde(default)]
    checks: Vec<CheckSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    kind: RuleKind,
    #[serde(default)]
    mappings: Vec<FieldMapping>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeSpecFile {
    #[serde(rename = "type")]
    discriminator: String,
    #[serde(default)]
    aliases: Vec<String>,
    legacy: SchemaFile,
    target: SchemaFile,
    rule: RuleFile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommonFile {
    legacy: SchemaFile,
    target: SchemaFile,
    #[serde(default)]
    mappings: Vec<FieldMapping>,
}

/// Immutable lookup of TypeSpecs by discriminator or alias.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    specs: Vec<TypeSpec>,
    index: HashMap<String, usize>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled TypeSpecs for the 11 supported question types.
    pub fn builtin() -> Result<Self, RegistryError> {
        let files = BUILTIN
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()))
            .collect();
        Self::from_sources(Some((COMMON_FILE, BUILTIN_COMMON)), files)
    }

    /// Load every `*.yaml`/`*.yml` in `dir`; `common.yaml`, when present, is the shared envelope.
    pub fn load_dir(dir: &Path) -> Result<Self, RegistryError> {
        let io_err = |source| RegistryError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut paths: Vec<_> = fs::read_dir(dir)
            .map_err(io_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_err)?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"))
            })
            .collect();
        paths.sort();

        let mut common = None;
        let mut files = Vec::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let text = fs::read_to_string(&path).map_err(|source| RegistryError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if name == COMMON_FILE {
                common = Some(text);
            } else {
                files.push((name, text));
            }
        }

        if files.is_empty() {
            return Err(RegistryError::Empty(dir.display().to_string()));
        }
        Self::from_sources(common.as_deref().map(|text| (COMMON_FILE, text)), files)
    }

    /// Build from in-memory YAML documents, `(name, text)` each.
    pub fn from_sources(common: Option<(&str, &str)>, files: Vec<(String, String)>) -> Result<Self, RegistryError> {
        let common: Option<CommonFile> = common
            .map(|(name, text)| {
                serde_yaml::from_str(text).map_err(|source| RegistryError::Parse {
                    name: name.to_string(),
                    source,
                })
            })
            .transpose()?;

        let mut registry = Self::new();
        for (name, text) in files {
            let file: TypeSpecFile = serde_yaml::from_str(&text).map_err(|source| RegistryError::Parse {
                name: name.clone(),
                source,
            })?;
            let spec = compose(&name, file, common.as_ref())?;
            registry.register(spec)?;
        }

        log::debug!("Loaded {} type specs", registry.len());
        Ok(registry)
    }

    /// Add a spec; its discriminator and aliases must all be new.
    pub fn register(&mut self, spec: TypeSpec) -> Result<(), RegistryError> {
        let names: Vec<String> = std::iter::once(spec.discriminator.clone())
            .chain(spec.aliases.iter().cloned())
            .collect();
        for name in &names {
            if self.index.contains_key(name) {
                return Err(RegistryError::DuplicateType(name.clone()));
            }
        }

        let slot = self.specs.len();
        self.specs.push(spec);
        for name in names {
            self.index.insert(name, slot);
        }
        Ok(())
    }

    /// Look up by discriminator or alias. Surrounding whitespace is ignored.
    pub fn resolve(&self, name: &str) -> Option<&TypeSpec> {
        self.index
            .get(name.trim())
            .map(|&slot| &self.specs[slot])
    }

    /// Primary discriminator for a name or alias.
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.resolve(name).map(TypeSpec::discriminator)
    }

    pub fn discriminators(&self) -> Vec<&str> {
        self.specs.iter().map(|spec| spec.discriminator()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn compose(name: &str, file: TypeSpecFile, common: Option<&CommonFile>) -> Result<TypeSpec, RegistryError> {
    let mut mappings = common.map(|c| c.mappings.clone()).unwrap_or_default();
    mappings.extend(file.rule.mappings);
    validate_mappings(name, &mappings)?;

    let schema_for = |phase: Phase, own: SchemaFile, shared: Option<&SchemaFile>| {
        let (document, checks) = match shared {
            Some(shared) => {
                let mut checks = shared.checks.clone();
                checks.extend(own.checks);
                (json!({ "allOf": [shared.schema, own.schema] }), checks)
            }
            None => (own.schema, own.checks),
        };
        StructuralSchema::compile(document, checks).map_err(|source| RegistryError::Schema {
            name: name.to_string(),
            phase,
            source,
        })
    };

    let legacy = schema_for(Phase::Pre, file.legacy, common.map(|c| &c.legacy))?;
    let target = schema_for(Phase::Post, file.target, common.map(|c| &c.target))?;

    Ok(TypeSpec::new(file.discriminator, legacy, target, file.rule.kind.build(mappings))
        .with_aliases(file.aliases))
}

/// Reject mappings that could never evaluate.
fn validate_mappings(name: &str, mappings: &[FieldMapping]) -> Result<(), RegistryError> {
    for mapping in mappings {
        let reason = if mapping.rule_id.is_empty() {
            Some("mapping has an empty rule_id".to_string())
        } else if mapping.target_path.is_empty() {
            Some(format!("mapping '{}' has an empty target_path", mapping.rule_id))
        } else {
            match mapping.mapping_type {
                MappingType::Transform if mapping.function.is_none() => {
                    Some(format!("transform mapping '{}' has no function", mapping.rule_id))
                }
                MappingType::Constant if mapping.default.is_none() => {
                    Some(format!("constant mapping '{}' has no default", mapping.rule_id))
                }
                MappingType::Copy | MappingType::Transform if mapping.source_path.is_none() => {
                    Some(format!("mapping '{}' has no source_path", mapping.rule_id))
                }
                _ => None,
            }
        };

        if let Some(reason) = reason {
            return Err(RegistryError::RuleValidationFailed {
                name: name.to_string(),
                reason,
            });
        }
    }
    Ok(())
}
