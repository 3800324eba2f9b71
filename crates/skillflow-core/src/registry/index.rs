//! Immutable, validated index of skills and flows.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use skillflow_types::error::{ManifestValidationError, NotFoundError};
use skillflow_types::flow::FlowDefinition;
use skillflow_types::manifest::{RegistryDescriptor, SkillManifest};

use super::compiled::CompiledFlow;
use super::validate::{compile_flow, validate_manifest};

/// One manifest or flow document with the name used in error messages.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    pub name: String,
    pub contents: String,
}

impl ManifestSource {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Raw YAML documents making up a registry.
#[derive(Debug, Clone, Default)]
pub struct RegistrySources {
    pub descriptor: Option<ManifestSource>,
    pub skills: Vec<ManifestSource>,
    pub flows: Vec<ManifestSource>,
}

/// Read-only lookup structure built by a successful load.
///
/// Never mutated once built; a reload builds a new index and swaps it in.
#[derive(Debug, Clone, Default)]
pub struct RegistryIndex {
    descriptor: RegistryDescriptor,
    skills: BTreeMap<String, SkillManifest>,
    flows: BTreeMap<String, CompiledFlow>,
}

impl RegistryIndex {
    /// Parse and validate every source. Any failure aborts the whole load.
    pub fn load(sources: &RegistrySources) -> Result<Self, ManifestValidationError> {
        let descriptor = match &sources.descriptor {
            Some(src) => parse_yaml::<RegistryDescriptor>(src)?,
            None => RegistryDescriptor::default(),
        };
        let skills = sources
            .skills
            .iter()
            .map(|src| Ok((src.name.clone(), parse_yaml::<SkillManifest>(src)?)))
            .collect::<Result<Vec<_>, ManifestValidationError>>()?;
        let flows = sources
            .flows
            .iter()
            .map(|src| Ok((src.name.clone(), parse_yaml::<FlowDefinition>(src)?)))
            .collect::<Result<Vec<_>, ManifestValidationError>>()?;
        Self::build(descriptor, skills, flows)
    }

    /// Build from already-parsed definitions, each paired with its source
    /// name.
    pub fn build(
        descriptor: RegistryDescriptor,
        skills: Vec<(String, SkillManifest)>,
        flows: Vec<(String, FlowDefinition)>,
    ) -> Result<Self, ManifestValidationError> {
        let mut skill_map = BTreeMap::new();
        for (source_name, manifest) in skills {
            validate_manifest(&manifest, &source_name)?;
            if skill_map.contains_key(&manifest.skill_id) {
                return Err(ManifestValidationError::DuplicateSkillId {
                    skill_id: manifest.skill_id,
                    source_name,
                });
            }
            skill_map.insert(manifest.skill_id.clone(), manifest);
        }

        let mut flow_map = BTreeMap::new();
        for (source_name, flow) in flows {
            let compiled = compile_flow(&flow, &skill_map, &source_name)?;
            if flow_map.contains_key(&flow.flow_id) {
                return Err(ManifestValidationError::DuplicateFlowId {
                    flow_id: flow.flow_id,
                    source_name,
                });
            }
            flow_map.insert(flow.flow_id.clone(), compiled);
        }

        if let Some(default_flow) = &descriptor.default_flow {
            if !flow_map.contains_key(default_flow) {
                return Err(ManifestValidationError::UnknownDefaultFlow {
                    flow_id: default_flow.clone(),
                });
            }
        }

        Ok(Self {
            descriptor,
            skills: skill_map,
            flows: flow_map,
        })
    }

    /// Build from definitions constructed in code. Source names are derived
    /// from the ids.
    pub fn from_definitions(
        skills: Vec<SkillManifest>,
        flows: Vec<FlowDefinition>,
    ) -> Result<Self, ManifestValidationError> {
        let skills = skills
            .into_iter()
            .map(|s| (format!("skill:{}", s.skill_id), s))
            .collect();
        let flows = flows
            .into_iter()
            .map(|f| (format!("flow:{}", f.flow_id), f))
            .collect();
        Self::build(RegistryDescriptor::default(), skills, flows)
    }

    pub fn lookup_skill(&self, skill_id: &str) -> Result<&SkillManifest, NotFoundError> {
        self.skills
            .get(skill_id)
            .ok_or_else(|| NotFoundError::Skill(skill_id.to_string()))
    }

    pub fn lookup_flow(&self, flow_id: &str) -> Result<&CompiledFlow, NotFoundError> {
        self.flows
            .get(flow_id)
            .ok_or_else(|| NotFoundError::Flow(flow_id.to_string()))
    }

    /// All skills, sorted by id.
    pub fn list_skills(&self) -> Vec<&SkillManifest> {
        self.skills.values().collect()
    }

    /// All flows, sorted by id.
    pub fn list_flows(&self) -> Vec<&FlowDefinition> {
        self.flows.values().map(|f| &f.definition).collect()
    }

    pub fn skills_by_tag(&self, tag: &str) -> Vec<&SkillManifest> {
        self.skills
            .values()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn flows_by_tag(&self, tag: &str) -> Vec<&FlowDefinition> {
        self.flows
            .values()
            .map(|f| &f.definition)
            .filter(|f| f.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn descriptor(&self) -> &RegistryDescriptor {
        &self.descriptor
    }

    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }
}

fn parse_yaml<T: DeserializeOwned>(src: &ManifestSource) -> Result<T, ManifestValidationError> {
    serde_yaml_ng::from_str(&src.contents).map_err(|e| ManifestValidationError::Parse {
        source_name: src.name.clone(),
        message: e.to_string(),
    })
}
