use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::mode::Mode;
use crate::model::yolo::{decode_head, finalize, Letterbox};
use crate::model::{Predictions, VisionModel};
use candle_core::{DType, Device, Tensor};
use candle_onnx::{onnx, read_file, simple_eval};
use image::RgbImage;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferenceOptions {
    pub input_size: u32,
    pub confidence: f32,
    pub iou: f32,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence: 0.25,
            iou: 0.45,
        }
    }
}

impl From<&Config> for InferenceOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            input_size: cfg.input_size,
            confidence: cfg.confidence,
            iou: cfg.iou,
        }
    }
}

/// A YOLO graph exported to ONNX, evaluated on the CPU by candle.
pub struct YoloOnnx {
    mode: Mode,
    model: onnx::ModelProto,
    input_name: String,
    output_names: Vec<String>,
    options: InferenceOptions,
    device: Device,
}

impl YoloOnnx {
    pub fn load(mode: Mode, path: &Path, options: InferenceOptions) -> Result<Self> {
        let init_err = |reason: String| PipelineError::Initialization {
            mode,
            path: path.to_path_buf(),
            reason,
        };
        if options.input_size == 0 || options.input_size % 32 != 0 {
            return Err(init_err(format!(
                "input size {} is not a positive multiple of 32",
                options.input_size
            )));
        }
        let mut model = read_file(path).map_err(|e| init_err(e.to_string()))?;
        patch_maxpool_padding(&mut model);
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| init_err("model graph missing".into()))?;
        let input_name = graph
            .input
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| init_err("model has no inputs".into()))?;
        let output_names: Vec<String> = graph.output.iter().map(|o| o.name.clone()).collect();
        let required = if mode == Mode::Segmentation { 2 } else { 1 };
        if output_names.len() < required {
            return Err(init_err(format!(
                "{mode} model needs {required} outputs, graph has {}",
                output_names.len()
            )));
        }
        debug!(%mode, path = %path.display(), input = %input_name, outputs = ?output_names, "model loaded");
        Ok(Self {
            mode,
            model,
            input_name,
            output_names,
            options,
            device: Device::Cpu,
        })
    }

    fn input_tensor(&self, input: RgbImage) -> Result<Tensor> {
        let size = self.options.input_size as usize;
        let tensor = Tensor::from_vec(input.into_raw(), (size, size, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?
            .contiguous()?
            .unsqueeze(0)?;
        Ok(tensor)
    }
}

impl VisionModel for YoloOnnx {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn predict(&self, frame: &RgbImage) -> Result<Predictions> {
        let letterbox = Letterbox::fit(frame.width(), frame.height(), self.options.input_size);
        let tensor = self.input_tensor(letterbox.apply(frame))?;

        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.clone(), tensor);
        let mut outputs = simple_eval(&self.model, inputs)?;

        let head = take_output(&mut outputs, &self.output_names[0])?
            .squeeze(0)?
            .to_dtype(DType::F32)?
            .to_vec2::<f32>()?;
        let protos = match self.mode {
            Mode::Segmentation => Some(
                take_output(&mut outputs, &self.output_names[1])?
                    .squeeze(0)?
                    .to_dtype(DType::F32)?
                    .to_vec3::<f32>()?,
            ),
            _ => None,
        };

        let candidates = decode_head(&head, self.mode.extra_channels(), self.options.confidence)?;
        trace!(mode = %self.mode, candidates = candidates.len(), "decoded head");
        finalize(
            self.mode,
            candidates,
            protos.as_deref(),
            &letterbox,
            frame.width(),
            frame.height(),
            self.options.iou,
        )
    }
}

fn take_output(outputs: &mut HashMap<String, Tensor>, name: &str) -> Result<Tensor> {
    outputs
        .remove(name)
        .ok_or_else(|| PipelineError::Inference(format!("model output {name:?} missing")))
}

/// candle's MaxPool does not pad, so padded pools are rewritten as an explicit
/// reflect Pad node feeding an unpadded pool. Reflection keeps the window
/// maximum unchanged for the k=2p+1 pools YOLO uses.
fn patch_maxpool_padding(model: &mut onnx::ModelProto) {
    let Some(graph) = model.graph.as_mut() else {
        return;
    };
    let mut nodes = Vec::with_capacity(graph.node.len());
    for mut node in std::mem::take(&mut graph.node) {
        if node.op_type != "MaxPool" {
            nodes.push(node);
            continue;
        }
        let pads = node
            .attribute
            .iter_mut()
            .find(|attr| attr.name == "pads" && attr.ints.iter().any(|&v| v != 0))
            .map(|attr| std::mem::replace(&mut attr.ints, vec![0; 4]));
        if let Some(pads) = pads.filter(|p| p.len() == 4) {
            let pads_name = format!("{}_pads", node.name);
            graph.initializer.push(onnx::TensorProto {
                name: pads_name.clone(),
                dims: vec![8],
                data_type: onnx::tensor_proto::DataType::Int64 as i32,
                int64_data: vec![0, 0, pads[0], pads[1], 0, 0, pads[2], pads[3]],
                ..Default::default()
            });
            let padded = format!("{}_padded", node.name);
            let mut pad = onnx::NodeProto {
                input: vec![node.input[0].clone(), pads_name],
                output: vec![padded.clone()],
                name: format!("{}_pad", node.name),
                op_type: "Pad".to_string(),
                ..Default::default()
            };
            pad.attribute.push(onnx::AttributeProto {
                name: "mode".to_string(),
                r#type: onnx::attribute_proto::AttributeType::String as i32,
                s: b"reflect".to_vec(),
                ..Default::default()
            });
            nodes.push(pad);
            node.input[0] = padded;
        }
        nodes.push(node);
    }
    graph.node = nodes;
}
