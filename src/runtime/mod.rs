//! Host side of a generated model. The [`Runtime`] owns every array the
//! merged groups point at, fills in the merged structs through the push
//! functions of the generated library and advances simulation time.

pub mod array;
pub mod library;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use crate::error::{ConfigurationError, RuntimeError, SpikeCodegenError};
use crate::groups::{GroupKind, GroupRef, MatrixConnectivity, MatrixWeight, ModelSpec, NeuronGroup};
use crate::merged::{var_type, FieldKind, FieldValue, MergedGroup, ModelMerged};
use crate::models::{Var, VarInit, EGP};
use crate::types::{parse_type, ResolvedType};
use crate::utils::ceil_divide;

pub use array::{ArrayData, HostData};
pub use library::{DevicePointer, LibraryCall, MockLibrary, ModelLibrary, PushValue, SharedLibrary};


/// Spikes or spike-like events recorded for one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedEvents {
    pub times: Vec<f64>,
    pub ids: Vec<u32>,
}

type GroupArrays = BTreeMap<String, ArrayData>;

/// Drives a generated library
#[derive(Debug)]
pub struct Runtime<'a, L: ModelLibrary> {
    merged: &'a ModelMerged<'a>,
    library: L,
    arrays: BTreeMap<GroupRef, GroupArrays>,
    dynamic_params: BTreeMap<(GroupRef, String), f64>,
    /// Host copy of the spike queue pointer of each delayed neuron group
    delay_pointers: BTreeMap<String, usize>,
    timestep: u64,
    num_recording_timesteps: Option<usize>,
    allocated: bool,
}

fn neuron_ref(name: &str) -> GroupRef {
    GroupRef::new(GroupKind::NeuronGroup, name)
}

fn is_uninitialised(initialisers: &BTreeMap<String, VarInit>, name: &str) -> bool {
    initialisers.get(name).map_or(true, |v| !v.requires_kernel())
}

/// Elements of a per neuron variable, shared variables have one per batch copy
fn var_count(var: &Var, num_elements: usize, duplicated: bool, batch_size: usize) -> usize {
    let elements = if var.access.is_shared_neuron() { 1 } else { num_elements };
    elements * if duplicated { batch_size } else { 1 }
}

fn find_egp<'e>(egps: impl IntoIterator<Item = &'e EGP>, name: &str) -> Option<&'e EGP> {
    egps.into_iter().find(|e| e.name == name)
}

impl<'a, L: ModelLibrary> Runtime<'a, L> {
    pub fn new(merged: &'a ModelMerged<'a>, library: L) -> Self {
        Runtime {
            merged,
            library,
            arrays: BTreeMap::new(),
            dynamic_params: BTreeMap::new(),
            delay_pointers: BTreeMap::new(),
            timestep: 0,
            num_recording_timesteps: None,
            allocated: false,
        }
    }

    fn model(&self) -> &'a ModelSpec {
        self.merged.model
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut L {
        &mut self.library
    }

    pub fn get_timestep(&self) -> u64 {
        self.timestep
    }

    pub fn set_timestep(&mut self, timestep: u64) {
        self.timestep = timestep;
    }

    pub fn get_time(&self) -> f64 {
        self.timestep as f64 * self.model().dt
    }

    pub fn get_num_recording_timesteps(&self) -> Option<usize> {
        self.num_recording_timesteps
    }

    /// Current spike queue slot of a neuron group, 0 for groups without delays
    pub fn get_delay_pointer(&self, group: &str) -> usize {
        self.delay_pointers.get(group).copied().unwrap_or(0)
    }

    fn create_array(
        &mut self,
        owner: &GroupRef,
        name: &str,
        ty: &ResolvedType,
        count: usize,
        uninitialised: bool,
    ) -> Result<(), SpikeCodegenError> {
        let host = HostData::zeros(ty, count).ok_or_else(|| {
            ConfigurationError::Unsupported(format!("Unable to allocate array '{}' of type '{}'", name, ty))
        })?;
        let mut array = ArrayData::new(ty.clone(), host, uninitialised);

        let group_arrays = self.arrays.entry(owner.clone()).or_default();
        if group_arrays.contains_key(name) {
            return Err(RuntimeError::DuplicateArray(name.to_string()).into());
        }

        let pointer = self.library.allocate_device_array(array.size_bytes())?;
        self.library.push_device_array(pointer, &array.host.to_bytes())?;
        array.device = Some(pointer);

        tracing::trace!("allocated {} '{}' of {} elements for {}", ty, name, count, owner);
        group_arrays.insert(name.to_string(), array);

        Ok(())
    }

    fn create_neuron_arrays(&mut self, ng: &NeuronGroup) -> Result<(), SpikeCodegenError> {
        let model = self.model();
        let context = model.type_context();
        let batch_size = model.batch_size;
        let owner = neuron_ref(&ng.name);
        let slots = ng.num_delay_slots.max(1);
        let n = ng.num_neurons;
        let uint = ResolvedType::uint32();

        if ng.is_recording_enabled() {
            let timesteps = self.num_recording_timesteps.ok_or(RuntimeError::RecordingTimestepsRequired)?;
            let words = ceil_divide(n, 32) * batch_size * timesteps;
            if ng.spike_recording_enabled {
                self.create_array(&owner, "recordSpk", &uint, words, true)?;
            }
            if ng.spike_event_recording_enabled {
                self.create_array(&owner, "recordSpkEvnt", &uint, words, true)?;
            }
        }

        self.create_array(&owner, "spkCnt", &uint, batch_size * slots, false)?;
        self.create_array(&owner, "spk", &uint, batch_size * slots * n, false)?;
        if ng.is_delay_required() {
            self.create_array(&owner, "spkQuePtr", &uint, 1, false)?;
            self.delay_pointers.insert(ng.name.clone(), 0);
        }
        if ng.spike_time_required {
            self.create_array(&owner, "sT", &context.timepoint, batch_size * slots * n, false)?;
        }
        if ng.prev_spike_time_required {
            self.create_array(&owner, "prevST", &context.timepoint, batch_size * slots * n, false)?;
        }
        if ng.spike_event_required {
            self.create_array(&owner, "spkCntEvnt", &uint, batch_size * slots, false)?;
            self.create_array(&owner, "spkEvnt", &uint, batch_size * slots * n, false)?;
        }

        for var in &ng.model.vars {
            let count = var_count(var, n, var.access.is_duplicated(), batch_size);
            let uninitialised = is_uninitialised(&ng.var_initialisers, &var.name);
            self.create_array(&owner, &var.name, &var_type(var, &context), count, uninitialised)?;
        }

        Ok(())
    }

    fn create_arrays(&mut self) -> Result<(), SpikeCodegenError> {
        let model = self.model();
        let context = model.type_context();
        let batch_size = model.batch_size;
        let uint = ResolvedType::uint32();

        for ng in &model.neuron_groups {
            self.create_neuron_arrays(ng)?;
        }

        for cs in &model.current_sources {
            let owner = GroupRef::new(GroupKind::CurrentSource, &cs.name);
            for var in &cs.model.vars {
                let count = var_count(var, cs.num_neurons, var.access.is_duplicated(), batch_size);
                let uninitialised = is_uninitialised(&cs.var_initialisers, &var.name);
                self.create_array(&owner, &var.name, &var_type(var, &context), count, uninitialised)?;
            }
        }

        for sg in &model.synapse_groups {
            let owner = GroupRef::new(GroupKind::SynapseGroup, &sg.name);
            let num_pre = sg.num_src_neurons;
            let num_post = sg.num_trg_neurons;

            self.create_array(&owner, "outPost", &context.scalar, num_post * batch_size, false)?;
            if sg.is_dendritic_delay_required() {
                let count = sg.max_dendritic_delay_timesteps * num_post * batch_size;
                self.create_array(&owner, "denDelay", &context.scalar, count, false)?;
                self.create_array(&owner, "denDelayPtr", &uint, 1, false)?;
            }
            if sg.is_pre_output_required() {
                self.create_array(&owner, "outPre", &context.scalar, num_pre * batch_size, false)?;
            }

            let connectivity_uninitialised = sg.connectivity_initialiser.as_ref().map_or(true, |c| {
                c.snippet.row_build_code.is_empty() && c.snippet.col_build_code.is_empty()
            });
            match sg.matrix_type.connectivity {
                MatrixConnectivity::Sparse => {
                    self.create_array(&owner, "rowLength", &uint, num_pre, connectivity_uninitialised)?;
                    self.create_array(&owner, "ind", &uint, num_pre * sg.row_stride(), connectivity_uninitialised)?;
                    if sg.is_col_structure_required() {
                        self.create_array(&owner, "colLength", &uint, num_post, false)?;
                        self.create_array(&owner, "remap", &uint, num_post * sg.col_stride(), false)?;
                    }
                },
                MatrixConnectivity::Bitmask => {
                    let words = ceil_divide(num_pre * sg.row_stride(), 32);
                    self.create_array(&owner, "gp", &uint, words, connectivity_uninitialised)?;
                },
                _ => {},
            }

            let weight_count = match sg.matrix_type.weight {
                MatrixWeight::Individual => Some(num_pre * sg.row_stride()),
                MatrixWeight::Kernel => Some(sg.flattened_kernel_size()),
                _ => None,
            };
            if let Some(count) = weight_count {
                for var in &sg.wu_model.vars {
                    let copies = if var.access.is_duplicated() { batch_size } else { 1 };
                    let uninitialised = is_uninitialised(&sg.wu_var_initialisers, &var.name);
                    self.create_array(&owner, &var.name, &var_type(var, &context), count * copies, uninitialised)?;
                }
            }

            for var in &sg.ps_model.vars {
                let count = var_count(var, num_post, var.access.is_duplicated(), batch_size);
                let uninitialised = is_uninitialised(&sg.ps_var_initialisers, &var.name);
                self.create_array(&owner, &var.name, &var_type(var, &context), count, uninitialised)?;
            }
        }

        for cu in &model.custom_updates {
            let owner = GroupRef::new(GroupKind::CustomUpdate, &cu.name);
            for var in &cu.model.vars {
                let count = var_count(var, cu.size, cu.is_var_duplicated(var), batch_size);
                let uninitialised = is_uninitialised(&cu.var_initialisers, &var.name);
                self.create_array(&owner, &var.name, &var_type(var, &context), count, uninitialised)?;
            }
        }

        for cu in &model.custom_wu_updates {
            let owner = GroupRef::new(GroupKind::CustomUpdateWU, &cu.name);
            let sg = &model.synapse_groups[cu.synapse_group];
            let size = if sg.has_kernel_weights() {
                sg.flattened_kernel_size()
            } else {
                sg.num_src_neurons * sg.row_stride()
            };
            for var in &cu.model.vars {
                let copies = if cu.is_var_duplicated(var) { batch_size } else { 1 };
                let uninitialised = is_uninitialised(&cu.var_initialisers, &var.name);
                self.create_array(&owner, &var.name, &var_type(var, &context), size * copies, uninitialised)?;
            }
        }

        Ok(())
    }

    fn field_push_value(&self, ty: &ResolvedType, value: &FieldValue) -> Result<Option<PushValue>, RuntimeError> {
        let push_value = match value {
            FieldValue::Array { owner, name } => match self.arrays.get(owner).and_then(|a| a.get(name)) {
                Some(array) => array.device.map(PushValue::Pointer),
                None => return Err(RuntimeError::UnknownArray { group: owner.name.clone(), name: name.clone() }),
            },
            FieldValue::Scalar(_) if ty.is_pointer() => Some(PushValue::Pointer(DevicePointer::default())),
            FieldValue::Scalar(v) => Some(PushValue::numeric(ty, *v)),
            FieldValue::DynamicParam { owner, name, value } => {
                let current = self.dynamic_params.get(&(owner.clone(), name.clone())).copied().unwrap_or(*value);
                Some(PushValue::numeric(ty, current))
            },
        };

        Ok(push_value)
    }

    /// Pushes every field of every member, extra global parameters are pushed once allocated
    fn push_merged_groups<G>(&mut self, groups: &[MergedGroup<'a, G>]) -> Result<(), SpikeCodegenError> {
        for merged in groups {
            for field in &merged.fields {
                for member in 0..merged.groups.len() {
                    let value = merged.get_field_value(field, member);
                    let push_value = match self.field_push_value(&field.ty, &value) {
                        Ok(push_value) => push_value,
                        Err(RuntimeError::UnknownArray { .. }) if field.kind == FieldKind::Dynamic => None,
                        Err(e) => return Err(e.into()),
                    };
                    if let Some(push_value) = push_value {
                        let function = merged.push_function_name(&field.name);
                        self.library.push_merged_field(&function, member as u32, push_value)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Allocates every array and fills in the merged structs, recording
    /// buffers are sized for `num_recording_timesteps` steps
    pub fn allocate(&mut self, num_recording_timesteps: Option<usize>) -> Result<(), SpikeCodegenError> {
        if self.allocated {
            return Err(ConfigurationError::AlreadyFinalised(format!("runtime for {}", self.model().name)).into());
        }

        self.library.allocate_mem()?;
        self.num_recording_timesteps = num_recording_timesteps;
        self.create_arrays()?;

        let merged = self.merged;
        self.push_merged_groups(&merged.neuron_update_groups)?;
        self.push_merged_groups(&merged.presynaptic_update_groups)?;
        self.push_merged_groups(&merged.postsynaptic_update_groups)?;
        self.push_merged_groups(&merged.synapse_dynamics_groups)?;
        self.push_merged_groups(&merged.neuron_init_groups)?;
        self.push_merged_groups(&merged.synapse_init_groups)?;
        self.push_merged_groups(&merged.synapse_connectivity_init_groups)?;
        self.push_merged_groups(&merged.synapse_sparse_init_groups)?;
        self.push_merged_groups(&merged.custom_update_init_groups)?;
        self.push_merged_groups(&merged.custom_wu_update_init_groups)?;
        self.push_merged_groups(&merged.neuron_spike_queue_update_groups)?;
        self.push_merged_groups(&merged.neuron_prev_spike_time_update_groups)?;
        self.push_merged_groups(&merged.synapse_dendritic_delay_update_groups)?;
        self.push_merged_groups(&merged.custom_update_groups)?;
        self.push_merged_groups(&merged.custom_wu_update_groups)?;
        self.push_merged_groups(&merged.custom_transpose_update_groups)?;

        self.allocated = true;

        tracing::debug!(
            "allocated {} arrays for {}",
            self.arrays.values().map(|a| a.len()).sum::<usize>(),
            self.model().name,
        );

        Ok(())
    }

    fn check_allocated(&self) -> Result<(), RuntimeError> {
        if self.allocated {
            Ok(())
        } else {
            Err(RuntimeError::NotAllocated)
        }
    }

    /// Runs the initialisation kernels
    pub fn initialize(&mut self) -> Result<(), SpikeCodegenError> {
        self.check_allocated()?;
        self.library.initialize()?;

        Ok(())
    }

    /// Pushes arrays which are filled in on the host then runs the sparse initialisation kernels
    pub fn initialize_sparse(&mut self) -> Result<(), SpikeCodegenError> {
        self.check_allocated()?;

        let library = &mut self.library;
        for array in self.arrays.values().flat_map(|a| a.values()).filter(|a| a.uninitialised) {
            if let Some(pointer) = array.device {
                library.push_device_array(pointer, &array.host.to_bytes())?;
            }
        }
        self.library.initialize_sparse()?;

        Ok(())
    }

    /// Advances the model one timestep
    pub fn step_time(&mut self) -> Result<(), SpikeCodegenError> {
        self.check_allocated()?;

        let recording_timesteps = self.num_recording_timesteps.unwrap_or(0) as u32;
        self.library.step_time(self.timestep, recording_timesteps)?;

        let model = self.model();
        for (name, pointer) in self.delay_pointers.iter_mut() {
            if let Some(ng) = model.get_neuron_group(name) {
                *pointer = (*pointer + 1) % ng.num_delay_slots.max(1);
            }
        }
        self.timestep += 1;

        Ok(())
    }

    /// Runs every custom update of an update group
    pub fn custom_update(&mut self, name: &str) -> Result<(), SpikeCodegenError> {
        self.check_allocated()?;
        if !self.merged.custom_update_group_names().iter().any(|n| n == name) {
            return Err(RuntimeError::UnknownCustomUpdate(name.to_string()).into());
        }
        self.library.custom_update(name)?;

        Ok(())
    }

    pub fn get_array(&self, owner: &GroupRef, name: &str) -> Result<&ArrayData, RuntimeError> {
        self.arrays.get(owner).and_then(|a| a.get(name))
            .ok_or_else(|| RuntimeError::UnknownArray { group: owner.name.clone(), name: name.to_string() })
    }

    pub fn get_array_mut(&mut self, owner: &GroupRef, name: &str) -> Result<&mut ArrayData, RuntimeError> {
        self.arrays.get_mut(owner).and_then(|a| a.get_mut(name))
            .ok_or_else(|| RuntimeError::UnknownArray { group: owner.name.clone(), name: name.to_string() })
    }

    pub fn push_array_to_device(&mut self, owner: &GroupRef, name: &str) -> Result<(), SpikeCodegenError> {
        self.check_allocated()?;
        let array = self.get_array(owner, name)?;
        let bytes = array.host.to_bytes();
        let pointer = array.device.ok_or(RuntimeError::NotAllocated)?;
        self.library.push_device_array(pointer, &bytes)?;

        Ok(())
    }

    pub fn pull_array_from_device(&mut self, owner: &GroupRef, name: &str) -> Result<(), SpikeCodegenError> {
        self.check_allocated()?;
        let (pointer, size) = {
            let array = self.get_array(owner, name)?;
            (array.device.ok_or(RuntimeError::NotAllocated)?, array.size_bytes())
        };

        let mut bytes = vec![0; size];
        self.library.pull_device_array(pointer, &mut bytes)?;
        self.get_array_mut(owner, name)?.host.copy_from_bytes(&bytes);

        Ok(())
    }

    /// Host values of an array converted to `f64`
    pub fn get_values(&self, owner: &GroupRef, name: &str) -> Result<Vec<f64>, RuntimeError> {
        Ok(self.get_array(owner, name)?.host.to_f64().to_vec())
    }

    /// Overwrites the host values of an array, values beyond its length are ignored
    pub fn set_values(&mut self, owner: &GroupRef, name: &str, values: &[f64]) -> Result<(), RuntimeError> {
        self.get_array_mut(owner, name)?.host.set_from_f64(values);

        Ok(())
    }

    fn initial_param_value(&self, owner: &GroupRef, name: &str) -> Option<f64> {
        let model = self.model();
        match owner.kind {
            GroupKind::NeuronGroup => model.get_neuron_group(&owner.name)?.get_param_value(name),
            GroupKind::CurrentSource => model.current_sources.iter()
                .find(|cs| cs.name == owner.name)?
                .get_param_value(name),
            GroupKind::SynapseGroup => {
                let sg = model.get_synapse_group(&owner.name)?;
                sg.get_wu_param_value(name).or_else(|| sg.get_ps_param_value(name))
            },
            GroupKind::CustomUpdate => model.custom_updates.iter()
                .find(|cu| cu.name == owner.name)?
                .get_param_value(name),
            GroupKind::CustomUpdateWU => model.custom_wu_updates.iter()
                .find(|cu| cu.name == owner.name)?
                .get_param_value(name),
        }
    }

    /// Current value of a dynamic parameter, the declared value until it is first set
    pub fn get_dynamic_param_value(&self, owner: &GroupRef, name: &str) -> Result<f64, RuntimeError> {
        let unknown = || RuntimeError::UnknownDynamicParam { group: owner.name.clone(), name: name.to_string() };
        if self.merged.get_dynamic_field_destinations(owner, name).is_empty() {
            return Err(unknown());
        }

        self.dynamic_params.get(&(owner.clone(), name.to_string())).copied()
            .or_else(|| self.initial_param_value(owner, name))
            .ok_or_else(unknown)
    }

    /// Pushes a new value of a dynamic parameter into every merged group it was merged into
    pub fn set_dynamic_param_value(&mut self, owner: &GroupRef, name: &str, value: f64) -> Result<(), SpikeCodegenError> {
        self.check_allocated()?;
        let destinations = self.merged.get_dynamic_field_destinations(owner, name);
        if destinations.is_empty() {
            return Err(RuntimeError::UnknownDynamicParam { group: owner.name.clone(), name: name.to_string() }.into());
        }

        let push_value = PushValue::numeric(&self.model().precision, value);
        for destination in destinations {
            self.library.push_merged_field(
                &destination.push_function_name(),
                destination.member_index as u32,
                push_value,
            )?;
        }
        self.dynamic_params.insert((owner.clone(), name.to_string()), value);

        tracing::debug!("set dynamic parameter '{}' of {} to {}", name, owner, value);

        Ok(())
    }

    fn egp_type(&self, owner: &GroupRef, name: &str) -> Option<ResolvedType> {
        let model = self.model();
        let egp = match owner.kind {
            GroupKind::NeuronGroup => find_egp(&model.get_neuron_group(&owner.name)?.model.snippet.extra_global_params, name),
            GroupKind::CurrentSource => {
                let cs = model.current_sources.iter().find(|cs| cs.name == owner.name)?;
                find_egp(&cs.model.snippet.extra_global_params, name)
            },
            GroupKind::SynapseGroup => {
                let sg = model.get_synapse_group(&owner.name)?;
                let connectivity = sg.connectivity_initialiser.iter().flat_map(|c| &c.snippet.snippet.extra_global_params);
                let toeplitz = sg.toeplitz_initialiser.iter().flat_map(|t| &t.snippet.snippet.extra_global_params);
                find_egp(
                    sg.wu_model.snippet.extra_global_params.iter()
                        .chain(&sg.ps_model.snippet.extra_global_params)
                        .chain(connectivity)
                        .chain(toeplitz),
                    name,
                )
            },
            GroupKind::CustomUpdate => {
                let cu = model.custom_updates.iter().find(|cu| cu.name == owner.name)?;
                find_egp(&cu.model.snippet.extra_global_params, name)
            },
            GroupKind::CustomUpdateWU => {
                let cu = model.custom_wu_updates.iter().find(|cu| cu.name == owner.name)?;
                find_egp(&cu.model.snippet.extra_global_params, name)
            },
        }?;

        let ty = parse_type(&egp.ty, &model.type_context())?;
        ty.get_pointee().cloned()
    }

    /// Allocates an extra global parameter of `count` elements and points its merged fields at it
    pub fn allocate_extra_global_param(&mut self, owner: &GroupRef, name: &str, count: usize) -> Result<(), SpikeCodegenError> {
        self.check_allocated()?;
        let ty = self.egp_type(owner, name)
            .ok_or_else(|| RuntimeError::UnknownArray { group: owner.name.clone(), name: name.to_string() })?;

        self.create_array(owner, name, &ty, count, true)?;
        let pointer = self.get_array(owner, name)?.device.ok_or(RuntimeError::NotAllocated)?;

        for destination in self.merged.get_dynamic_field_destinations(owner, name) {
            self.library.push_merged_field(
                &destination.push_function_name(),
                destination.member_index as u32,
                PushValue::Pointer(pointer),
            )?;
        }

        Ok(())
    }

    fn check_recording(&self) -> Result<usize, RuntimeError> {
        let timesteps = self.num_recording_timesteps.ok_or(RuntimeError::RecordingNotAllocated("pull from device"))?;
        if (self.timestep as usize) < timesteps {
            return Err(RuntimeError::RecordingBufferNotFull);
        }

        Ok(timesteps)
    }

    /// Copies every recording buffer back to the host
    pub fn pull_recording_buffers_from_device(&mut self) -> Result<(), SpikeCodegenError> {
        self.check_allocated()?;
        if self.num_recording_timesteps.is_none() {
            return Err(RuntimeError::RecordingNotAllocated("pull from device").into());
        }

        let model = self.model();
        for ng in model.neuron_groups.iter().filter(|ng| ng.is_recording_enabled()) {
            let owner = neuron_ref(&ng.name);
            if ng.spike_recording_enabled {
                self.pull_array_from_device(&owner, "recordSpk")?;
            }
            if ng.spike_event_recording_enabled {
                self.pull_array_from_device(&owner, "recordSpkEvnt")?;
            }
        }

        Ok(())
    }

    /// Decodes a recording buffer, bit `i` of word `w` is set when neuron `32w + i` fired
    fn get_recorded_events(&self, group: &str, array_name: &'static str) -> Result<Vec<RecordedEvents>, SpikeCodegenError> {
        let timesteps = self.check_recording()?;
        let model = self.model();
        let ng = model.get_neuron_group(group)
            .ok_or_else(|| ConfigurationError::UnknownGroup { kind: "neuron group", name: group.to_string() })?;
        let buffer = self.get_array(&neuron_ref(group), array_name)
            .map_err(|_| RuntimeError::RecordingNotAllocated("read recorded events"))?;
        let words = buffer.host.as_u32().ok_or(RuntimeError::RecordingNotAllocated("read recorded events"))?;

        let num_words = ceil_divide(ng.num_neurons, 32);
        let batch_size = model.batch_size;
        let start_time = (self.timestep as f64 - timesteps as f64) * model.dt;

        let mut events = vec![RecordedEvents::default(); batch_size];
        for t in 0..timesteps {
            let time = start_time + (t as f64 * model.dt);
            for (b, batch_events) in events.iter_mut().enumerate() {
                let offset = (t * batch_size * num_words) + (b * num_words);
                for w in 0..num_words {
                    let mut word = words[offset + w];
                    let mut neuron_id = (w as i64 * 32) + 31;
                    while word != 0 {
                        let leading_zeros = word.leading_zeros();
                        word = if leading_zeros == 31 { 0 } else { word << (leading_zeros + 1) };
                        neuron_id -= leading_zeros as i64;
                        batch_events.times.push(time);
                        batch_events.ids.push(neuron_id as u32);
                        neuron_id -= 1;
                    }
                }
            }
        }

        Ok(events)
    }

    /// Recorded spikes of a neuron group per batch, the buffer must be full and pulled from the device
    pub fn get_recorded_spikes(&self, group: &str) -> Result<Vec<RecordedEvents>, SpikeCodegenError> {
        self.get_recorded_events(group, "recordSpk")
    }

    pub fn get_recorded_spike_events(&self, group: &str) -> Result<Vec<RecordedEvents>, SpikeCodegenError> {
        self.get_recorded_events(group, "recordSpkEvnt")
    }

    fn write_recorded_events(&self, group: &str, array_name: &'static str, path: &Path) -> Result<(), SpikeCodegenError> {
        let events = self.get_recorded_events(group, array_name)?;
        let io_error = |e: std::io::Error| RuntimeError::Io { path: path.display().to_string(), message: e.to_string() };

        let mut file = BufWriter::new(File::create(path).map_err(io_error)?);
        let batched = events.len() > 1;
        if batched {
            writeln!(file, "Time [ms], Neuron ID, Batch").map_err(io_error)?;
        } else {
            writeln!(file, "Time [ms], Neuron ID").map_err(io_error)?;
        }

        for (b, batch_events) in events.iter().enumerate() {
            for (time, id) in batch_events.times.iter().zip(&batch_events.ids) {
                if batched {
                    writeln!(file, "{}, {}, {}", time, id, b).map_err(io_error)?;
                } else {
                    writeln!(file, "{}, {}", time, id).map_err(io_error)?;
                }
            }
        }
        file.flush().map_err(io_error)?;

        tracing::info!("wrote recorded events of '{}' to {}", group, path.display());

        Ok(())
    }

    /// Writes recorded spikes as csv, a batch column is added for batched models
    pub fn write_recorded_spikes(&self, group: &str, path: &Path) -> Result<(), SpikeCodegenError> {
        self.write_recorded_events(group, "recordSpk", path)
    }

    pub fn write_recorded_spike_events(&self, group: &str, path: &Path) -> Result<(), SpikeCodegenError> {
        self.write_recorded_events(group, "recordSpkEvnt", path)
    }

    /// Frees every device array and the library's own state
    pub fn free(&mut self) -> Result<(), SpikeCodegenError> {
        for array in self.arrays.values_mut().flat_map(|a| a.values_mut()) {
            if let Some(pointer) = array.device.take() {
                self.library.free_device_array(pointer)?;
            }
        }
        self.arrays.clear();
        if self.allocated {
            self.library.free_mem()?;
        }
        self.allocated = false;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use crate::groups::{GroupKind, GroupRef, ModelSpec};
    use crate::merged::ModelMerged;
    use crate::models::{neuron_models, param_values, VarInit};
    use super::{LibraryCall, MockLibrary, PushValue, Runtime};

    fn izhikevich_model(recording: bool) -> ModelSpec {
        let mut model = ModelSpec::new("runtime");
        model.set_dt(0.5).unwrap();
        let params = param_values(&[("a", 0.02), ("b", 0.2), ("c", -65.0), ("d", 8.0)]);
        let vars = BTreeMap::from([
            ("V".to_string(), VarInit::constant(-65.0)),
            ("U".to_string(), VarInit::uninitialised()),
        ]);
        model.add_neuron_population("Exc", 40, neuron_models::izhikevich(), params, vars).unwrap()
            .set_spike_recording_enabled(recording);
        model.finalise().unwrap();
        model
    }

    #[test]
    fn test_allocate_pushes_every_field() {
        let model = izhikevich_model(false);
        let merged = ModelMerged::new(&model).unwrap();
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        runtime.allocate(None).unwrap();

        let owner = GroupRef::new(GroupKind::NeuronGroup, "Exc");
        assert_eq!(runtime.get_array(&owner, "V").unwrap().len(), 40);
        assert_eq!(runtime.get_array(&owner, "spkCnt").unwrap().len(), 1);
        assert!(runtime.get_array(&owner, "U").unwrap().uninitialised);
        assert!(!runtime.get_array(&owner, "V").unwrap().uninitialised);

        let spk_cnt = runtime.get_array(&owner, "spkCnt").unwrap().device.unwrap();
        let pushes = runtime.library().pushed_values("pushMergedNeuronUpdateGroup0spkCntToDevice");
        assert_eq!(pushes, vec![(0, PushValue::Pointer(spk_cnt))]);
        assert_eq!(runtime.library().calls[0], LibraryCall::AllocateMem);
    }

    #[test]
    fn test_recording_requires_timesteps() {
        let model = izhikevich_model(true);
        let merged = ModelMerged::new(&model).unwrap();
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        assert!(runtime.allocate(None).is_err());
    }

    #[test]
    fn test_recorded_spikes_decoded() {
        let model = izhikevich_model(true);
        let merged = ModelMerged::new(&model).unwrap();
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        runtime.allocate(Some(2)).unwrap();
        runtime.initialize().unwrap();
        runtime.initialize_sparse().unwrap();

        assert!(runtime.get_recorded_spikes("Exc").is_err());
        runtime.step_time().unwrap();
        runtime.step_time().unwrap();

        let owner = GroupRef::new(GroupKind::NeuronGroup, "Exc");
        let pointer = runtime.get_array(&owner, "recordSpk").unwrap().device.unwrap();
        let words: [u32; 4] = [0b1001, 0, 1 << 31, 1 << 2];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        runtime.library_mut().device_memory_mut(pointer).unwrap().copy_from_slice(&bytes);
        runtime.pull_recording_buffers_from_device().unwrap();

        let spikes = runtime.get_recorded_spikes("Exc").unwrap();
        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].ids, vec![3, 0, 31, 34]);
        assert_eq!(spikes[0].times, vec![0.0, 0.0, 0.5, 0.5]);
    }
}
