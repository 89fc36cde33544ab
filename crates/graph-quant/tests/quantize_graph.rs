use graph_quant::{
    Activation, Data, DataType, Graph, GraphQuantizer, LayerKind, QuantizationParams,
    QuantizerError, QuantizerOptions, TensorRef,
};

fn activation_chain(function: Activation) -> Graph {
    let mut graph = Graph::new();
    let input = graph.add_input("input", 0, vec![1, 8]);
    let act = graph.add_activation("act", function, TensorRef::new(input, 0));
    graph.add_output("output", 0, TensorRef::new(act, 0));
    graph
}

fn symmetric_options() -> QuantizerOptions {
    QuantizerOptions {
        activation_format: DataType::QSymmS16,
    }
}

fn params(graph: &Graph, layer: usize, slot: usize) -> QuantizationParams {
    graph
        .output_info(TensorRef::new(layer, slot))
        .quantization
        .unwrap()
}

mod affine {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn should_quantize_a_bounded_activation_chain() {
        let graph = activation_chain(Activation::BoundedRelu {
            lower: 0.0,
            upper: 6.0,
        });
        let mut quantizer = GraphQuantizer::new(graph, QuantizerOptions::default());
        quantizer.override_input_range(0, -10.0, 10.0);

        let quantized = quantizer.export_network().unwrap();

        assert_eq!(quantized.len(), 3);

        let input = quantized.output_info(TensorRef::new(0, 0));
        assert_eq!(input.dtype, DataType::QAsymmU8);
        assert_eq!(
            input.quantization,
            Some(QuantizationParams::new(20.0 / 255.0, 128))
        );

        let act = quantized.output_info(TensorRef::new(1, 0));
        assert_eq!(act.dtype, DataType::QAsymmU8);
        assert_eq!(
            act.quantization,
            Some(QuantizationParams::new(6.0 / 255.0, 0))
        );

        // Output layers forward a tensor and produce nothing themselves.
        assert!(quantized.layer(2).outputs.is_empty());
    }

    #[test]
    fn should_fall_back_to_the_default_input_range() {
        let graph = activation_chain(Activation::Relu);
        let mut quantizer = GraphQuantizer::new(graph, QuantizerOptions::default());

        let quantized = quantizer.export_network().unwrap();

        assert_eq!(
            params(&quantized, 0, 0),
            QuantizationParams::new(30.0 / 255.0, 128)
        );
        assert_eq!(
            params(&quantized, 1, 0),
            QuantizationParams::new(15.0 / 255.0, 0)
        );
    }

    #[test]
    fn should_prefer_an_override_to_the_default() {
        let graph = activation_chain(Activation::Relu);
        let mut quantizer = GraphQuantizer::new(graph, QuantizerOptions::default());
        quantizer.override_input_range(0, -2.0, 2.0);

        let quantized = quantizer.export_network().unwrap();

        assert_eq!(
            params(&quantized, 0, 0),
            QuantizationParams::new(4.0 / 255.0, 128)
        );
        assert_eq!(
            params(&quantized, 1, 0),
            QuantizationParams::new(2.0 / 255.0, 0)
        );
    }

    #[test]
    fn should_ignore_an_override_for_an_unknown_binding() {
        let graph = activation_chain(Activation::Relu);
        let mut quantizer = GraphQuantizer::new(graph, QuantizerOptions::default());
        quantizer.override_input_range(99, -1.0, 1.0);

        let quantized = quantizer.export_network().unwrap();

        assert_eq!(
            params(&quantized, 0, 0),
            QuantizationParams::new(30.0 / 255.0, 128)
        );
    }

    #[test]
    fn should_stamp_every_split_slot() {
        let mut graph = Graph::new();
        let input = graph.add_input("input", 0, vec![4, 4]);
        let split = graph.add_split("split", 2, TensorRef::new(input, 0));
        graph.add_output("left", 0, TensorRef::new(split, 0));
        graph.add_output("right", 1, TensorRef::new(split, 1));
        let mut quantizer = GraphQuantizer::new(graph, QuantizerOptions::default());
        quantizer.override_input_range(0, -3.0, 3.0);

        let quantized = quantizer.export_network().unwrap();

        let expected = QuantizationParams::new(6.0 / 255.0, 128);
        assert_eq!(params(&quantized, split, 0), expected);
        assert_eq!(params(&quantized, split, 1), expected);
    }
}

mod symmetric {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn should_quantize_to_symmetric_i16() {
        let graph = activation_chain(Activation::Tanh);
        let mut quantizer = GraphQuantizer::new(graph, symmetric_options());
        quantizer.override_input_range(0, -4.0, 4.0);

        let quantized = quantizer.export_network().unwrap();

        let input = quantized.output_info(TensorRef::new(0, 0));
        assert_eq!(input.dtype, DataType::QSymmS16);
        assert_eq!(
            input.quantization,
            Some(QuantizationParams::new(4.0 / 32767.0, 0))
        );

        let tanh = quantized.output_info(TensorRef::new(1, 0));
        assert_eq!(tanh.dtype, DataType::QSymmS16);
        assert_eq!(
            tanh.quantization,
            Some(QuantizationParams::new(1.0 / 32767.0, 0))
        );
    }
}

mod constants {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn should_requantize_float_payloads() {
        let mut graph = Graph::new();
        let input = graph.add_input("input", 0, vec![3]);
        let constant = graph.add_constant("bias", vec![3], Data::Float32(vec![-1.0, 0.0, 1.0]));
        let add = graph.add_add("add", TensorRef::new(input, 0), TensorRef::new(constant, 0));
        graph.add_output("output", 0, TensorRef::new(add, 0));
        let mut quantizer = GraphQuantizer::new(graph, QuantizerOptions::default());

        let quantized = quantizer.export_network().unwrap();

        assert_eq!(
            quantized.layer(constant).kind,
            LayerKind::Constant {
                data: Data::QAsymmU8(vec![1, 128, 255]),
            }
        );
        assert_eq!(
            params(&quantized, constant, 0),
            QuantizationParams::new(2.0 / 255.0, 128)
        );
        // The addition covers both operand ranges.
        assert_eq!(
            params(&quantized, add, 0),
            QuantizationParams::new(30.0 / 255.0, 128)
        );
    }

    #[test]
    fn should_keep_prequantized_payloads() {
        let mut graph = Graph::new();
        let constant = graph.add_constant("codes", vec![2], Data::QAsymmU8(vec![7, 9]));
        graph.add_output("output", 0, TensorRef::new(constant, 0));
        let mut quantizer = GraphQuantizer::new(graph, QuantizerOptions::default());

        let quantized = quantizer.export_network().unwrap();

        assert_eq!(
            quantized.layer(constant).kind,
            LayerKind::Constant {
                data: Data::QAsymmU8(vec![7, 9]),
            }
        );
    }
}

mod structure {
    use super::*;
    use pretty_assertions::assert_eq;

    fn linear_model() -> Graph {
        let mut graph = Graph::new();
        let input = graph.add_input("input", 0, vec![1, 8]);
        let weight = graph.add_constant("weight", vec![4, 8], Data::Float32(vec![0.5; 32]));
        let bias = graph.add_constant("bias", vec![4], Data::Float32(vec![0.1; 4]));
        let linear = graph.add_linear(
            "linear",
            TensorRef::new(input, 0),
            TensorRef::new(weight, 0),
            Some(TensorRef::new(bias, 0)),
        );
        let relu = graph.add_activation("relu", Activation::Relu, TensorRef::new(linear, 0));
        graph.add_output("output", 0, TensorRef::new(relu, 0));
        graph
    }

    #[test]
    fn should_preserve_names_edges_and_kinds() {
        let graph = linear_model();
        let mut quantizer = GraphQuantizer::new(graph.clone(), QuantizerOptions::default());

        let quantized = quantizer.export_network().unwrap();

        assert_eq!(quantized.len(), graph.len());
        for (id, layer) in graph.layers() {
            assert_eq!(quantized.layer(id).name, layer.name);
            assert_eq!(quantized.layer(id).inputs, layer.inputs);
            assert_eq!(quantized.layer(id).kind.to_string(), layer.kind.to_string());
        }
    }

    #[test]
    fn should_requantize_linear_weights_and_bias() {
        let graph = linear_model();
        let mut quantizer = GraphQuantizer::new(graph, QuantizerOptions::default());

        let quantized = quantizer.export_network().unwrap();

        // weight is layer 1, bias layer 2
        for id in [1, 2] {
            if let LayerKind::Constant { data } = &quantized.layer(id).kind {
                assert_eq!(data.dtype(), DataType::QAsymmU8);
            } else {
                panic!("layer {id} should still be a constant");
            }
        }
    }

    #[test]
    fn should_export_the_same_graph_twice() {
        let graph = linear_model();
        let mut quantizer = GraphQuantizer::new(graph, QuantizerOptions::default());
        quantizer.override_input_range(0, -1.0, 1.0);

        let first = quantizer.export_network().unwrap();
        let second = quantizer.export_network().unwrap();

        assert_eq!(first, second);
    }
}

mod errors {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn should_reject_a_float_activation_format() {
        let graph = activation_chain(Activation::Relu);
        let mut quantizer = GraphQuantizer::new(
            graph,
            QuantizerOptions {
                activation_format: DataType::Float32,
            },
        );

        let error = quantizer.export_network().unwrap_err();

        assert_eq!(error, QuantizerError::UnsupportedTarget(DataType::Float32));
        assert_eq!(error.to_string(), "unsupported quantization target Float32");
    }
}
