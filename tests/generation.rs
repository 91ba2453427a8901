#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use spike_codegen::codegen::{generate_module_sources, write_module_sources, Backend};
    use spike_codegen::config::{Platform, Preferences};
    use spike_codegen::groups::{
        ConnectivityInit, MatrixType, ModelSpec, PostsynapticInit, WUVarReference, WeightUpdateInit,
    };
    use spike_codegen::merged::ModelMerged;
    use spike_codegen::models::{
        current_source_models, custom_update_models, init_sparse_connectivity_snippets,
        init_var_snippets, neuron_models, param_values, postsynaptic_models, weight_update_models,
        ParamValues, SparseConnectivityInit, VarInit,
    };
    use spike_codegen::utils::digest_to_hex;


    fn lif(model: &mut ModelSpec, name: &str, size: usize) {
        let params = param_values(&[
            ("C", 1.0), ("TauM", 20.0), ("Vrest", -70.0), ("Vreset", -70.0),
            ("Vthresh", -51.0), ("Ioffset", 0.0), ("TauRefrac", 2.0),
        ]);
        let vars = BTreeMap::from([
            ("V".to_string(), VarInit::new(init_var_snippets::uniform(), param_values(&[("min", -70.0), ("max", -51.0)]))),
            ("RefracTime".to_string(), VarInit::constant(0.0)),
        ]);
        model.add_neuron_population(name, size, neuron_models::lif(), params, vars).unwrap();
    }

    fn static_pulse(g: VarInit) -> WeightUpdateInit {
        WeightUpdateInit::new(weight_update_models::static_pulse(), ParamValues::new(), BTreeMap::from([("g".to_string(), g)]))
    }

    fn network(dt: f64) -> ModelSpec {
        let mut model = ModelSpec::new("network");
        model.set_dt(dt).unwrap();
        lif(&mut model, "Pre", 20);
        lif(&mut model, "Post", 30);
        model.neuron_group_mut("Pre").unwrap().set_spike_recording_enabled(true);

        let exp_curr = || PostsynapticInit::new(postsynaptic_models::exp_curr(), param_values(&[("tau", 5.0)]), BTreeMap::new());
        let uniform = VarInit::new(init_var_snippets::uniform(), param_values(&[("min", 0.0), ("max", 0.1)]));

        model.add_synapse_population(
            "Fwd", MatrixType::from_name("DENSE_INDIVIDUALG").unwrap(), "Pre", "Post",
            static_pulse(uniform), exp_curr(), ConnectivityInit::Uninitialised,
        ).unwrap();
        model.add_synapse_population(
            "Back", MatrixType::from_name("DENSE_INDIVIDUALG").unwrap(), "Post", "Pre",
            static_pulse(VarInit::constant(0.0)), exp_curr(), ConnectivityInit::Uninitialised,
        ).unwrap();
        model.add_synapse_population(
            "Sparse", MatrixType::sparse(), "Pre", "Post",
            static_pulse(VarInit::constant(0.05)),
            PostsynapticInit::new(postsynaptic_models::delta_curr(), ParamValues::new(), BTreeMap::new()),
            ConnectivityInit::Sparse(SparseConnectivityInit::new(
                init_sparse_connectivity_snippets::fixed_probability(),
                param_values(&[("prob", 0.1)]),
            )),
        ).unwrap().set_axonal_delay_steps(3);

        model.add_current_source("Bias", current_source_models::dc(), "Post", param_values(&[("amp", 0.5)]), BTreeMap::new())
            .unwrap();
        model.add_custom_update_wu(
            "Transpose", "CalculateTranspose", custom_update_models::transpose(),
            ParamValues::new(), BTreeMap::new(),
            BTreeMap::from([("variable".to_string(), WUVarReference::with_transpose("Fwd", "g", "Back", "g"))]),
        ).unwrap();

        model.finalise().unwrap();
        model
    }

    #[test]
    fn test_generation_is_deterministic() {
        let first_model = network(0.1);
        let second_model = network(0.1);
        let first = ModelMerged::new(&first_model).unwrap();
        let second = ModelMerged::new(&second_model).unwrap();
        assert_eq!(first.hash_digest(), second.hash_digest());

        let backend = Backend::new(Preferences::default()).unwrap();
        let first_sources = generate_module_sources(&first, &backend).unwrap();
        let second_sources = generate_module_sources(&second, &backend).unwrap();
        assert_eq!(first_sources, second_sources);

        let definitions = &first_sources["definitions.h"];
        assert!(definitions.contains(&digest_to_hex(&first.hash_digest())));
        assert!(definitions.contains("EXPORT_FUNC void updateCalculateTranspose();"));
    }

    #[test]
    fn test_timestep_changes_generated_code() {
        let backend = Backend::new(Preferences::default()).unwrap();
        let coarse_model = network(1.0);
        let fine_model = network(0.1);
        let coarse = generate_module_sources(&ModelMerged::new(&coarse_model).unwrap(), &backend).unwrap();
        let fine = generate_module_sources(&ModelMerged::new(&fine_model).unwrap(), &backend).unwrap();

        assert_ne!(coarse["definitions.h"], fine["definitions.h"]);
    }

    #[test]
    fn test_platforms_differ_only_in_backend_code() {
        let model = network(0.1);
        let merged = ModelMerged::new(&model).unwrap();

        let cuda = generate_module_sources(&merged, &Backend::new(Preferences::default()).unwrap()).unwrap();
        let opencl_preferences = Preferences { platform: Platform::OpenCL, ..Preferences::default() };
        let opencl = generate_module_sources(&merged, &Backend::new(opencl_preferences).unwrap()).unwrap();

        assert_eq!(cuda.keys().collect::<Vec<_>>(), opencl.keys().collect::<Vec<_>>());
        assert_eq!(cuda["definitions.h"], opencl["definitions.h"]);
        assert_ne!(cuda["neuronUpdate.cc"], opencl["neuronUpdate.cc"]);
        assert!(cuda["customUpdate.cc"].contains("EXPORT_FUNC void updateCalculateTranspose()"));
        assert!(opencl["customUpdate.cc"].contains("EXPORT_FUNC void updateCalculateTranspose()"));
    }

    #[test]
    fn test_sources_written_to_directory() {
        let model = network(0.1);
        let merged = ModelMerged::new(&model).unwrap();
        let directory = tempfile::tempdir().unwrap();
        let output = directory.path().join("network_CODE");

        let files = write_module_sources(&merged, &Backend::new(Preferences::default()).unwrap(), &output).unwrap();

        assert_eq!(files.len(), 6);
        for file in &files {
            let contents = std::fs::read_to_string(output.join(file)).unwrap();
            assert!(!contents.is_empty());
        }
        let runner = std::fs::read_to_string(output.join("runner.cc")).unwrap();
        assert!(runner.contains("EXPORT_FUNC void stepTime("));
    }
}
