//! Merging of structurally identical groups. Groups whose code would be
//! identical are merged into one [`MergedGroup`] and anything that differs
//! between them becomes a [`Field`] of a generated struct, filled in per group
//! when the library is loaded.

pub mod neuron;
pub mod synapse;
pub mod custom_update;
pub mod model_merged;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use crate::groups::GroupRef;
use crate::types::ResolvedType;
use crate::utils::HashDigest;

pub use model_merged::{DynamicFieldDestination, ModelMerged};


/// Kind of kernel a merged group is generated into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MergedKind {
    NeuronUpdate,
    PresynapticUpdate,
    PostsynapticUpdate,
    SynapseDynamics,
    NeuronInit,
    SynapseInit,
    SynapseConnectivityInit,
    SynapseSparseInit,
    CustomUpdateInit,
    CustomWUUpdateInit,
    NeuronSpikeQueueUpdate,
    NeuronPrevSpikeTimeUpdate,
    SynapseDendriticDelayUpdate,
    CustomUpdate,
    CustomWUUpdate,
    CustomTransposeUpdate,
}

impl MergedKind {
    pub fn name(&self) -> &'static str {
        match self {
            MergedKind::NeuronUpdate => "NeuronUpdate",
            MergedKind::PresynapticUpdate => "PresynapticUpdate",
            MergedKind::PostsynapticUpdate => "PostsynapticUpdate",
            MergedKind::SynapseDynamics => "SynapseDynamics",
            MergedKind::NeuronInit => "NeuronInit",
            MergedKind::SynapseInit => "SynapseInit",
            MergedKind::SynapseConnectivityInit => "SynapseConnectivityInit",
            MergedKind::SynapseSparseInit => "SynapseSparseInit",
            MergedKind::CustomUpdateInit => "CustomUpdateInit",
            MergedKind::CustomWUUpdateInit => "CustomWUUpdateInit",
            MergedKind::NeuronSpikeQueueUpdate => "NeuronSpikeQueueUpdate",
            MergedKind::NeuronPrevSpikeTimeUpdate => "NeuronPrevSpikeTimeUpdate",
            MergedKind::SynapseDendriticDelayUpdate => "SynapseDendriticDelayUpdate",
            MergedKind::CustomUpdate => "CustomUpdate",
            MergedKind::CustomWUUpdate => "CustomUpdateWU",
            MergedKind::CustomTransposeUpdate => "CustomUpdateTranspose",
        }
    }
}

/// Whether a field is set once when the library is loaded or may be pushed again later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Standard,
    /// Extra global parameters and dynamic parameters
    Dynamic,
}

/// Value of a field for one member of a merged group
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Device pointer of a runtime array
    Array { owner: GroupRef, name: String },
    /// Value known when merging
    Scalar(f64),
    /// Parameter which can be changed at runtime, starts at `value`
    DynamicParam { owner: GroupRef, name: String, value: f64 },
}

impl FieldValue {
    pub fn array(owner: GroupRef, name: &str) -> Self {
        FieldValue::Array { owner, name: name.to_string() }
    }
}

pub type FieldGetter<'a, G> = Box<dyn Fn(&G, usize) -> FieldValue + Send + Sync + 'a>;

/// Named value which differs between members of a merged group
pub struct Field<'a, G> {
    pub ty: ResolvedType,
    pub name: String,
    pub getter: FieldGetter<'a, G>,
    pub kind: FieldKind,
}

impl<G> std::fmt::Debug for Field<'_, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field({} {}, {:?})", self.ty, self.name, self.kind)
    }
}

/// Children of a group merged alongside it, such as incoming postsynaptic models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChildKind {
    CurrentSource,
    InSyn,
    OutSynPreOutput,
    OutSynEventThreshold,
}

impl ChildKind {
    /// Suffix appended to fields belonging to a child
    pub fn suffix(&self, index: usize) -> String {
        match self {
            ChildKind::CurrentSource => format!("CS{}", index),
            ChildKind::InSyn => format!("InSyn{}", index),
            ChildKind::OutSynPreOutput => format!("OutSyn{}", index),
            ChildKind::OutSynEventThreshold => format!("EventThresh{}", index),
        }
    }
}

/// Per member, ordered indices of each member's children
pub type ChildIndices = Arc<Vec<Vec<usize>>>;

/// Group of structurally identical groups generated as one piece of code
pub struct MergedGroup<'a, G> {
    pub kind: MergedKind,
    pub index: usize,
    /// Members, the first is the archetype whose shape drives code generation
    pub groups: Vec<&'a G>,
    /// Index of each member within its vector in the model
    pub group_indices: Vec<usize>,
    pub fields: Vec<Field<'a, G>>,
    pub children: BTreeMap<ChildKind, ChildIndices>,
    pub digest: HashDigest,
    /// Parameters shared by every member, written into code as literals
    pub literal_params: BTreeMap<String, f64>,
}

impl<G> std::fmt::Debug for MergedGroup<'_, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedGroup")
            .field("kind", &self.kind)
            .field("index", &self.index)
            .field("group_indices", &self.group_indices)
            .field("fields", &self.fields)
            .finish()
    }
}

impl<'a, G> MergedGroup<'a, G> {
    pub fn new(kind: MergedKind, index: usize, groups: Vec<(usize, &'a G)>, digest: HashDigest) -> Self {
        let (group_indices, groups) = groups.into_iter().unzip();

        MergedGroup {
            kind,
            index,
            groups,
            group_indices,
            fields: vec![],
            children: BTreeMap::new(),
            digest,
            literal_params: BTreeMap::new(),
        }
    }

    pub fn archetype(&self) -> &'a G {
        self.groups[0]
    }

    /// Name of the generated struct
    pub fn struct_name(&self) -> String {
        format!("Merged{}Group{}", self.kind.name(), self.index)
    }

    /// Name of the exported function which pushes a new value of a field
    pub fn push_function_name(&self, field_name: &str) -> String {
        format!("push{}{}ToDevice", self.struct_name(), field_name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn get_field(&self, name: &str) -> Option<&Field<'a, G>> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Adds a field, a field with the same name is only ever added once
    pub fn add_field(
        &mut self,
        ty: ResolvedType,
        name: &str,
        getter: impl Fn(&G, usize) -> FieldValue + Send + Sync + 'a,
        kind: FieldKind,
    ) {
        if !self.has_field(name) {
            self.fields.push(Field { ty, name: name.to_string(), getter: Box::new(getter), kind });
        }
    }

    /// Adds a field pointing at a runtime array owned by each member or one of its relatives
    pub fn add_array_field(
        &mut self,
        ty: ResolvedType,
        name: &str,
        owner: impl Fn(&G, usize) -> GroupRef + Send + Sync + 'a,
        array_name: &str,
    ) {
        let array_name = array_name.to_string();
        self.add_field(
            ty.create_pointer(),
            name,
            move |g, i| FieldValue::Array { owner: owner(g, i), name: array_name.clone() },
            FieldKind::Standard,
        );
    }

    pub fn get_field_value(&self, field: &Field<'a, G>, member: usize) -> FieldValue {
        (field.getter)(self.groups[member], member)
    }

    /// Does a value differ between any member and the archetype
    pub fn is_heterogeneous(&self, value: impl Fn(&G, usize) -> f64) -> bool {
        let archetype_value = value(self.groups[0], 0);
        self.groups.iter().enumerate().skip(1)
            .any(|(i, &g)| value(g, i).to_bits() != archetype_value.to_bits())
    }

    /// Adds scalar fields for the parameters whose values differ between
    /// members or which are dynamic, the rest are written into code as literals
    pub fn add_heterogeneous_params(
        &mut self,
        names: &[String],
        suffix: &str,
        scalar: &ResolvedType,
        owner: impl Fn(&G, usize) -> GroupRef + Clone + Send + Sync + 'a,
        value: impl Fn(&G, usize, &str) -> f64 + Clone + Send + Sync + 'a,
        is_dynamic: impl Fn(&G, &str) -> bool,
    ) {
        for name in names {
            let field_name = format!("{}{}", name, suffix);
            if is_dynamic(self.archetype(), name) {
                let param_name = name.clone();
                let owner = owner.clone();
                let value = value.clone();
                self.add_field(
                    scalar.clone(),
                    &field_name,
                    move |g, i| FieldValue::DynamicParam {
                        owner: owner(g, i),
                        name: param_name.clone(),
                        value: value(g, i, &param_name),
                    },
                    FieldKind::Dynamic,
                );
            } else if self.is_heterogeneous(|g, i| value(g, i, name)) {
                let param_name = name.clone();
                let value = value.clone();
                self.add_field(
                    scalar.clone(),
                    &field_name,
                    move |g, i| FieldValue::Scalar(value(g, i, &param_name)),
                    FieldKind::Standard,
                );
            } else {
                let archetype_value = value(self.archetype(), 0, name);
                self.literal_params.insert(field_name, archetype_value);
            }
        }
    }

    /// Adds a dynamic pointer field for each extra global parameter
    pub fn add_egp_fields(
        &mut self,
        egps: &[crate::models::EGP],
        suffix: &str,
        context: &crate::types::TypeContext,
        owner: impl Fn(&G, usize) -> GroupRef + Clone + Send + Sync + 'a,
    ) {
        for egp in egps {
            let ty = crate::types::parse_type(&egp.ty, context).unwrap_or_else(|| context.scalar.create_pointer());
            let egp_name = egp.name.clone();
            let owner = owner.clone();
            self.add_field(
                ty,
                &format!("{}{}", egp.name, suffix),
                move |g, i| FieldValue::Array { owner: owner(g, i), name: egp_name.clone() },
                FieldKind::Dynamic,
            );
        }
    }

    pub fn children(&self, kind: ChildKind) -> Option<&ChildIndices> {
        self.children.get(&kind)
    }

    /// Number of children of a kind, identical for every member
    pub fn num_children(&self, kind: ChildKind) -> usize {
        self.children.get(&kind).and_then(|c| c.first()).map_or(0, |c| c.len())
    }
}

/// Resolves the type of a model variable, types are checked when the model is finalised
pub fn var_type(var: &crate::models::Var, context: &crate::types::TypeContext) -> ResolvedType {
    crate::types::parse_type(&var.ty, context).unwrap_or_else(|| context.scalar.clone())
}

/// Orders child indices by digest, children with equal digests keep their order
pub fn sort_children(indices: &[usize], digest: impl Fn(usize) -> HashDigest) -> Vec<usize> {
    let mut sorted: Vec<(HashDigest, usize)> = indices.iter().map(|&i| (digest(i), i)).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    sorted.into_iter().map(|(_, i)| i).collect()
}

/// Groups items with identical digests preserving the order each digest is first seen
pub fn group_by_digest<'a, G>(
    items: impl Iterator<Item = (usize, &'a G)>,
    digest: impl Fn(usize, &G) -> HashDigest,
) -> Vec<(HashDigest, Vec<(usize, &'a G)>)> {
    let mut positions: HashMap<HashDigest, usize> = HashMap::new();
    let mut groups: Vec<(HashDigest, Vec<(usize, &'a G)>)> = vec![];

    for (index, item) in items {
        let item_digest = digest(index, item);
        match positions.get(&item_digest) {
            Some(position) => groups[*position].1.push((index, item)),
            None => {
                positions.insert(item_digest, groups.len());
                groups.push((item_digest, vec![(index, item)]));
            },
        }
    }

    groups
}
