#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use rand::Rng;
    use spike_codegen::groups::{ConnectivityInit, ModelSpec, MatrixType, PostsynapticInit, WeightUpdateInit};
    use spike_codegen::merged::{FieldValue, ModelMerged};
    use spike_codegen::models::{
        init_sparse_connectivity_snippets, init_var_snippets, neuron_models, param_values, postsynaptic_models,
        weight_update_models, ParamValues, SparseConnectivityInit, VarInit,
    };


    fn lif_params(c: f64, tau_m: f64) -> ParamValues {
        param_values(&[
            ("C", c), ("TauM", tau_m), ("Vrest", -70.0), ("Vreset", -70.0),
            ("Vthresh", -51.0), ("Ioffset", 0.0), ("TauRefrac", 2.0),
        ])
    }

    fn lif_vars() -> BTreeMap<String, VarInit> {
        BTreeMap::from([
            ("V".to_string(), VarInit::constant(-70.0)),
            ("RefracTime".to_string(), VarInit::constant(0.0)),
        ])
    }

    #[test]
    fn test_identical_populations_share_a_kernel() {
        let mut rng = rand::thread_rng();
        let mut model = ModelSpec::new("merging");
        let sizes: Vec<usize> = (0..5).map(|_| rng.gen_range(1..1000)).collect();
        for (i, size) in sizes.iter().enumerate() {
            model.add_neuron_population(&format!("Pop{}", i), *size, neuron_models::lif(), lif_params(1.0, 20.0), lif_vars())
                .unwrap();
        }
        model.add_neuron_population("Izk", 10, neuron_models::izhikevich(),
            param_values(&[("a", 0.02), ("b", 0.2), ("c", -65.0), ("d", 8.0)]),
            BTreeMap::from([("V".to_string(), VarInit::constant(-65.0)), ("U".to_string(), VarInit::constant(-13.0))]),
        ).unwrap();
        model.finalise().unwrap();

        let merged = ModelMerged::new(&model).unwrap();
        assert_eq!(merged.neuron_update_groups.len(), 2);

        let lif_group = merged.neuron_update_groups.iter().find(|m| m.groups.len() == 5).unwrap();
        assert!(!lif_group.has_field("C"));
        assert!(!lif_group.has_field("TauM"));

        let field = lif_group.get_field("numNeurons").unwrap();
        for (member, group) in lif_group.groups.iter().enumerate() {
            assert_eq!(lif_group.get_field_value(field, member), FieldValue::Scalar(group.num_neurons as f64));
        }
    }

    #[test]
    fn test_differing_params_become_fields() {
        let mut rng = rand::thread_rng();
        let mut model = ModelSpec::new("merging");
        let capacitances: Vec<f64> = (0..4).map(|_| rng.gen_range(0.5..2.0)).collect();
        for (i, c) in capacitances.iter().enumerate() {
            model.add_neuron_population(&format!("Pop{}", i), 100, neuron_models::lif(), lif_params(*c, 20.0), lif_vars())
                .unwrap();
        }
        model.finalise().unwrap();

        let merged = ModelMerged::new(&model).unwrap();
        assert_eq!(merged.neuron_update_groups.len(), 1);

        let group = &merged.neuron_update_groups[0];
        assert!(!group.has_field("TauM"));
        let c_field = group.get_field("C").unwrap();
        let r_field = group.get_field("Rmembrane").unwrap();
        for member in 0..group.groups.len() {
            let c = capacitances[group.group_indices[member]];
            assert_eq!(group.get_field_value(c_field, member), FieldValue::Scalar(c));
            assert_eq!(group.get_field_value(r_field, member), FieldValue::Scalar(20.0 / c));
        }
    }

    #[test]
    fn test_array_fields_point_at_owner() {
        let mut model = ModelSpec::new("merging");
        model.add_neuron_population("Pre", 20, neuron_models::lif(), lif_params(1.0, 20.0), lif_vars()).unwrap();
        model.add_neuron_population("Post", 30, neuron_models::lif(), lif_params(1.0, 20.0), lif_vars()).unwrap();
        let wu = WeightUpdateInit::new(
            weight_update_models::static_pulse(),
            ParamValues::new(),
            BTreeMap::from([("g".to_string(), VarInit::constant(0.5))]),
        );
        let ps = PostsynapticInit::new(postsynaptic_models::exp_curr(), param_values(&[("tau", 5.0)]), BTreeMap::new());
        let connectivity = ConnectivityInit::Sparse(SparseConnectivityInit::new(
            init_sparse_connectivity_snippets::fixed_probability(),
            param_values(&[("prob", 0.25)]),
        ));
        model.add_synapse_population("Syn", MatrixType::sparse(), "Pre", "Post", wu, ps, connectivity).unwrap();
        model.finalise().unwrap();

        let merged = ModelMerged::new(&model).unwrap();
        assert_eq!(merged.presynaptic_update_groups.len(), 1);

        let group = &merged.presynaptic_update_groups[0];
        let value = |name: &str| group.get_field_value(group.get_field(name).unwrap(), 0);
        match value("srcSpk") {
            FieldValue::Array { owner, name } => {
                assert_eq!(owner.name, "Pre");
                assert_eq!(name, "spk");
            },
            other => panic!("unexpected field value {:?}", other),
        }
        match value("ind") {
            FieldValue::Array { owner, name } => {
                assert_eq!(owner.name, "Syn");
                assert_eq!(name, "ind");
            },
            other => panic!("unexpected field value {:?}", other),
        }
    }

    fn projected_network(v_thresh: f64, tau: f64, prob: f64, v_max: f64) -> ModelSpec {
        let mut params = lif_params(1.0, 20.0);
        params.insert("Vthresh".to_string(), v_thresh);
        let vars = BTreeMap::from([
            ("V".to_string(), VarInit::new(init_var_snippets::uniform(), param_values(&[("min", -70.0), ("max", v_max)]))),
            ("RefracTime".to_string(), VarInit::constant(0.0)),
        ]);

        let mut model = ModelSpec::new("literals");
        model.add_neuron_population("Pre", 20, neuron_models::lif(), params.clone(), vars.clone()).unwrap();
        model.add_neuron_population("Post", 30, neuron_models::lif(), params, vars).unwrap();
        let wu = WeightUpdateInit::new(
            weight_update_models::static_pulse(),
            ParamValues::new(),
            BTreeMap::from([("g".to_string(), VarInit::constant(0.5))]),
        );
        let ps = PostsynapticInit::new(postsynaptic_models::exp_curr(), param_values(&[("tau", tau)]), BTreeMap::new());
        let connectivity = ConnectivityInit::Sparse(SparseConnectivityInit::new(
            init_sparse_connectivity_snippets::fixed_probability(),
            param_values(&[("prob", prob)]),
        ));
        model.add_synapse_population("Syn", MatrixType::sparse(), "Pre", "Post", wu, ps, connectivity).unwrap();
        model.finalise().unwrap();
        model
    }

    #[test]
    fn test_shared_param_values_change_digest() {
        let digest = |model: &ModelSpec| ModelMerged::new(model).unwrap().hash_digest();

        let reference = digest(&projected_network(-51.0, 5.0, 0.1, -51.0));
        assert_eq!(reference, digest(&projected_network(-51.0, 5.0, 0.1, -51.0)));

        assert_ne!(reference, digest(&projected_network(-40.0, 5.0, 0.1, -51.0)));
        assert_ne!(reference, digest(&projected_network(-51.0, 10.0, 0.1, -51.0)));
        assert_ne!(reference, digest(&projected_network(-51.0, 5.0, 0.2, -51.0)));
        assert_ne!(reference, digest(&projected_network(-51.0, 5.0, 0.1, -55.0)));
    }

    #[test]
    fn test_shared_params_are_recorded_as_literals() {
        let model = projected_network(-51.0, 5.0, 0.1, -51.0);
        let merged = ModelMerged::new(&model).unwrap();

        let neurons = merged.neuron_update_groups.iter().find(|m| m.archetype().name == "Post").unwrap();
        assert_eq!(neurons.literal_params.get("Vthresh"), Some(&-51.0));
        assert_eq!(neurons.literal_params.get("tauInSyn0"), Some(&5.0));
        assert!(!neurons.has_field("Vthresh"));

        let connectivity = &merged.synapse_connectivity_init_groups[0];
        assert_eq!(connectivity.literal_params.get("prob"), Some(&0.1));
    }
}
