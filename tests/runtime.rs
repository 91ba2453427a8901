#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use spike_codegen::error::{RuntimeError, SpikeCodegenError};
    use spike_codegen::groups::{
        ConnectivityInit, GroupKind, GroupRef, MatrixType, ModelSpec, PostsynapticInit, WeightUpdateInit,
    };
    use spike_codegen::merged::ModelMerged;
    use spike_codegen::models::{
        init_sparse_connectivity_snippets, neuron_models, param_values, postsynaptic_models,
        weight_update_models, ParamValues, SparseConnectivityInit, VarInit,
    };
    use spike_codegen::runtime::{LibraryCall, MockLibrary, PushValue, Runtime};


    fn lif_params() -> ParamValues {
        param_values(&[
            ("C", 1.0), ("TauM", 20.0), ("Vrest", -70.0), ("Vreset", -70.0),
            ("Vthresh", -51.0), ("Ioffset", 0.0), ("TauRefrac", 2.0),
        ])
    }

    fn lif_vars() -> BTreeMap<String, VarInit> {
        BTreeMap::from([
            ("V".to_string(), VarInit::constant(-70.0)),
            ("RefracTime".to_string(), VarInit::constant(0.0)),
        ])
    }

    fn delayed_network(batch_size: usize) -> ModelSpec {
        let mut model = ModelSpec::new("delayed");
        model.set_dt(1.0).unwrap();
        model.set_batch_size(batch_size).unwrap();
        model.add_neuron_population("Pre", 40, neuron_models::lif(), lif_params(), lif_vars()).unwrap()
            .set_spike_recording_enabled(true);
        model.add_neuron_population("Post", 10, neuron_models::lif(), lif_params(), lif_vars()).unwrap()
            .set_param_dynamic("C", true).unwrap();

        let wu = WeightUpdateInit::new(
            weight_update_models::static_pulse(),
            ParamValues::new(),
            BTreeMap::from([("g".to_string(), VarInit::constant(0.1))]),
        );
        let ps = PostsynapticInit::new(postsynaptic_models::delta_curr(), ParamValues::new(), BTreeMap::new());
        let connectivity = ConnectivityInit::Sparse(SparseConnectivityInit::new(
            init_sparse_connectivity_snippets::fixed_probability(),
            param_values(&[("prob", 0.5)]),
        ));
        model.add_synapse_population("Syn", MatrixType::sparse(), "Pre", "Post", wu, ps, connectivity).unwrap()
            .set_axonal_delay_steps(3);

        model.finalise().unwrap();
        model
    }

    fn neuron(name: &str) -> GroupRef {
        GroupRef::new(GroupKind::NeuronGroup, name)
    }

    #[test]
    fn test_delay_pointer_wraps() -> Result<(), SpikeCodegenError> {
        let model = delayed_network(1);
        let merged = ModelMerged::new(&model)?;
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        runtime.allocate(Some(10))?;
        runtime.initialize()?;
        runtime.initialize_sparse()?;

        assert_eq!(runtime.get_array(&neuron("Pre"), "spkCnt")?.len(), 4);
        assert_eq!(runtime.get_array(&neuron("Pre"), "spk")?.len(), 160);
        assert_eq!(runtime.get_array(&neuron("Post"), "spkCnt")?.len(), 1);

        for _ in 0..5 {
            runtime.step_time()?;
        }
        assert_eq!(runtime.get_delay_pointer("Pre"), 1);
        assert_eq!(runtime.get_delay_pointer("Post"), 0);
        assert_eq!(runtime.get_timestep(), 5);
        assert_eq!(runtime.get_time(), 5.0);

        let steps: Vec<u64> = runtime.library().calls.iter()
            .filter_map(|c| match c {
                LibraryCall::StepTime { timestep, num_recording_timesteps } => {
                    assert_eq!(*num_recording_timesteps, 10);
                    Some(*timestep)
                },
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec![0, 1, 2, 3, 4]);

        Ok(())
    }

    #[test]
    fn test_sparse_arrays_sized_by_row_stride() -> Result<(), SpikeCodegenError> {
        let model = delayed_network(1);
        let merged = ModelMerged::new(&model)?;
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        runtime.allocate(Some(1))?;

        let synapses = GroupRef::new(GroupKind::SynapseGroup, "Syn");
        let row_stride = model.get_synapse_group("Syn").unwrap().row_stride();
        assert_eq!(runtime.get_array(&synapses, "rowLength")?.len(), 40);
        assert_eq!(runtime.get_array(&synapses, "ind")?.len(), 40 * row_stride);
        assert_eq!(runtime.get_array(&synapses, "g")?.len(), 40 * row_stride);
        assert_eq!(runtime.get_array(&synapses, "outPost")?.len(), 10);
        assert!(!runtime.get_array(&synapses, "ind")?.uninitialised);

        Ok(())
    }

    #[test]
    fn test_vars_survive_device_round_trip() -> Result<(), SpikeCodegenError> {
        let model = delayed_network(1);
        let merged = ModelMerged::new(&model)?;
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        runtime.allocate(Some(1))?;

        let post = neuron("Post");
        let voltages: Vec<f64> = (0..10).map(|i| -70.0 + i as f64).collect();
        runtime.set_values(&post, "V", &voltages)?;
        runtime.push_array_to_device(&post, "V")?;

        runtime.set_values(&post, "V", &[0.0; 10])?;
        runtime.pull_array_from_device(&post, "V")?;
        assert_eq!(runtime.get_values(&post, "V")?, voltages);

        assert!(matches!(runtime.get_values(&post, "W"), Err(RuntimeError::UnknownArray { .. })));

        Ok(())
    }

    #[test]
    fn test_dynamic_param_pushed_to_destinations() -> Result<(), SpikeCodegenError> {
        let model = delayed_network(1);
        let merged = ModelMerged::new(&model)?;
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        runtime.allocate(Some(1))?;

        let post = neuron("Post");
        assert_eq!(runtime.get_dynamic_param_value(&post, "C")?, 1.0);
        runtime.set_dynamic_param_value(&post, "C", 2.5)?;
        assert_eq!(runtime.get_dynamic_param_value(&post, "C")?, 2.5);

        let destination = &merged.get_dynamic_field_destinations(&post, "C")[0];
        let pushes = runtime.library().pushed_values(&destination.push_function_name());
        assert_eq!(pushes.last(), Some(&(destination.member_index as u32, PushValue::Float(2.5))));

        assert!(runtime.set_dynamic_param_value(&post, "TauM", 10.0).is_err());
        assert!(runtime.set_dynamic_param_value(&neuron("Pre"), "C", 10.0).is_err());

        Ok(())
    }

    #[test]
    fn test_recording_buffer_must_be_full() -> Result<(), SpikeCodegenError> {
        let model = delayed_network(1);
        let merged = ModelMerged::new(&model)?;
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        runtime.allocate(Some(3))?;

        runtime.step_time()?;
        runtime.pull_recording_buffers_from_device()?;
        assert!(matches!(
            runtime.get_recorded_spikes("Pre"),
            Err(SpikeCodegenError::RuntimeRelatedError(RuntimeError::RecordingBufferNotFull)),
        ));

        runtime.step_time()?;
        runtime.step_time()?;
        let spikes = runtime.get_recorded_spikes("Pre")?;
        assert_eq!(spikes.len(), 1);
        assert!(spikes[0].ids.is_empty());

        Ok(())
    }

    #[test]
    fn test_unallocated_recording_cannot_be_pulled() -> Result<(), SpikeCodegenError> {
        let mut model = ModelSpec::new("unrecorded");
        model.add_neuron_population("Pop", 10, neuron_models::lif(), lif_params(), lif_vars())?;
        model.finalise()?;
        let merged = ModelMerged::new(&model)?;
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        runtime.allocate(None)?;

        assert!(matches!(
            runtime.pull_recording_buffers_from_device(),
            Err(SpikeCodegenError::RuntimeRelatedError(RuntimeError::RecordingNotAllocated(_))),
        ));

        Ok(())
    }

    #[test]
    fn test_batched_spikes_written_as_csv() -> Result<(), SpikeCodegenError> {
        let model = delayed_network(2);
        let merged = ModelMerged::new(&model)?;
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        runtime.allocate(Some(2))?;
        runtime.step_time()?;
        runtime.step_time()?;

        let pre = neuron("Pre");
        let pointer = runtime.get_array(&pre, "recordSpk")?.device.unwrap();
        // 2 words per batch, 2 batches, 2 timesteps
        let words: [u32; 8] = [1, 0, 1 << 1, 0, 0, 1 << 7, 0, 0];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        runtime.library_mut().device_memory_mut(pointer).unwrap()[..bytes.len()].copy_from_slice(&bytes);
        runtime.pull_recording_buffers_from_device()?;

        let spikes = runtime.get_recorded_spikes("Pre")?;
        assert_eq!(spikes[0].ids, vec![0, 39]);
        assert_eq!(spikes[0].times, vec![0.0, 1.0]);
        assert_eq!(spikes[1].ids, vec![1]);

        let directory = tempfile::tempdir()?;
        let path = directory.path().join("pre_spikes.csv");
        runtime.write_recorded_spikes("Pre", &path)?;

        let contents = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["Time [ms], Neuron ID, Batch", "0, 0, 0", "1, 39, 0", "0, 1, 1"]);

        Ok(())
    }
}
