//! Job graphs submitted to ComfyUI's `/prompt` endpoint.
//!
//! A graph is either loaded from a workflow file (API format, optionally wrapped
//! in `{"prompt": ...}`) or taken from the built-in defaults below. The prompt
//! text is routed through the KSampler's `positive` link when the graph has one.
use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};
use crate::generation::types::{GenerationParams, MediaKind};

/// Node input keys that `apply_params` is allowed to overwrite.
const KNOWN_PARAM_KEYS: &[&str] = &[
    "seed",
    "steps",
    "cfg",
    "width",
    "height",
    "length",
    "frame_rate",
    "fps",
    "ckpt_name",
    "filename_prefix",
];

/// Settings that shape a graph independently of the prompt.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub checkpoint: String,
    pub filename_prefix: String,
    pub frame_rate: u32,
    pub default_duration: u32,
}

/// Read a workflow file and return the bare node graph.
pub async fn load_template(path: &str) -> AppResult<Value> {
    let content = tokio::fs::read_to_string(path).await?;
    let wf: Value = serde_json::from_str(&content)?;
    let graph = match wf.get("prompt") {
        Some(inner) => inner.clone(),
        None => wf,
    };
    if !is_probably_graph(&graph) {
        return Err(AppError::ComfyUI(format!("{} does not look like an API-format workflow", path)));
    }
    Ok(graph)
}

/// Built-in text-to-image / text-to-video graphs.
pub fn default_graph(kind: MediaKind, settings: &GraphSettings) -> Value {
    let latent = match kind {
        MediaKind::Image => json!({
            "class_type": "EmptyLatentImage",
            "inputs": { "width": 1024, "height": 1024, "batch_size": 1 }
        }),
        MediaKind::Video => json!({
            "class_type": "EmptyHunyuanLatentVideo",
            "inputs": { "width": 848, "height": 480, "length": 25, "batch_size": 1 }
        }),
    };
    let save = match kind {
        MediaKind::Image => json!({
            "class_type": "SaveImage",
            "inputs": { "images": ["8", 0] }
        }),
        MediaKind::Video => json!({
            "class_type": "SaveAnimatedWEBP",
            "inputs": {
                "images": ["8", 0],
                "fps": settings.frame_rate,
                "lossless": false,
                "quality": 90,
                "method": "default"
            }
        }),
    };
    json!({
        "4": {
            "class_type": "CheckpointLoaderSimple",
            "inputs": { "ckpt_name": settings.checkpoint }
        },
        "5": latent,
        "6": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": "", "clip": ["4", 1] }
        },
        "7": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": "blurry, low quality, watermark", "clip": ["4", 1] }
        },
        "3": {
            "class_type": "KSampler",
            "inputs": {
                "seed": 0,
                "steps": 25,
                "cfg": 7.0,
                "sampler_name": "euler",
                "scheduler": "normal",
                "denoise": 1.0,
                "model": ["4", 0],
                "positive": ["6", 0],
                "negative": ["7", 0],
                "latent_image": ["5", 0]
            }
        },
        "8": {
            "class_type": "VAEDecode",
            "inputs": { "samples": ["3", 0], "vae": ["4", 2] }
        },
        "9": save
    })
}

/// Fill `graph` with the prompt text and per-request parameters.
pub fn prepare_graph(
    mut graph: Value,
    kind: MediaKind,
    text: &str,
    params: GenerationParams,
    settings: &GraphSettings,
    seed: u64,
) -> AppResult<Value> {
    if !apply_prompt_text(&mut graph, text) {
        return Err(AppError::ComfyUI("workflow has no CLIPTextEncode node to receive the prompt".to_string()));
    }

    let mut overrides = Map::new();
    overrides.insert("seed".into(), Value::from(seed));
    if kind == MediaKind::Video {
        let seconds = params.duration_seconds.unwrap_or(settings.default_duration).max(1);
        let frames = seconds.saturating_mul(settings.frame_rate).saturating_add(1);
        overrides.insert("length".into(), Value::from(frames));
        overrides.insert("frame_rate".into(), Value::from(settings.frame_rate));
        overrides.insert("fps".into(), Value::from(settings.frame_rate));
    }
    apply_params(&mut graph, &overrides);
    ensure_filename_prefix(&mut graph, &settings.filename_prefix);
    Ok(graph)
}

/// Set known keys on every node input that already has them.
pub fn apply_params(graph: &mut Value, params: &Map<String, Value>) {
    let kvs: Vec<(&str, &Value)> = KNOWN_PARAM_KEYS
        .iter()
        .filter_map(|k| params.get(*k).map(|v| (*k, v)))
        .collect();
    if kvs.is_empty() {
        return;
    }
    if let Some(nodes) = graph.as_object_mut() {
        for node in nodes.values_mut() {
            if let Some(inputs) = node.get_mut("inputs").and_then(|v| v.as_object_mut()) {
                for (k, v) in &kvs {
                    // Linked inputs are arrays like ["5", 0]; leave the wiring alone.
                    if inputs.get(*k).is_some_and(|cur| !cur.is_array()) {
                        inputs.insert((*k).to_string(), (*v).clone());
                    }
                }
            }
        }
    }
}

/// Route `text` into the positive prompt node. Returns false if no text node exists.
pub fn apply_prompt_text(graph: &mut Value, text: &str) -> bool {
    let target = find_first_node_id_by_class(graph, "KSampler")
        .and_then(|ks| linked_source(graph, &ks, "positive"))
        .filter(|id| has_text_input(graph, id))
        .or_else(|| collect_text_encode_ids(graph).into_iter().next());

    match target {
        Some(id) => set_node_text(graph, &id, text),
        None => false,
    }
}

pub fn ensure_filename_prefix(graph: &mut Value, default_prefix: &str) {
    if let Some(obj) = graph.as_object_mut() {
        for node in obj.values_mut() {
            let is_save = node
                .get("class_type")
                .and_then(|v| v.as_str())
                .is_some_and(|ct| ct.starts_with("Save"));
            if !is_save {
                continue;
            }
            if let Some(inputs) = node.get_mut("inputs").and_then(|v| v.as_object_mut()) {
                inputs
                    .entry("filename_prefix")
                    .or_insert_with(|| Value::String(default_prefix.to_string()));
            }
        }
    }
}

pub fn is_probably_graph(graph: &Value) -> bool {
    graph
        .as_object()
        .is_some_and(|obj| obj.values().any(|node| node.get("class_type").and_then(|ct| ct.as_str()).is_some()))
}

fn find_first_node_id_by_class(graph: &Value, class_type: &str) -> Option<String> {
    let mut ids: Vec<&String> = graph
        .as_object()?
        .iter()
        .filter(|(_, node)| node.get("class_type").and_then(|ct| ct.as_str()) == Some(class_type))
        .map(|(id, _)| id)
        .collect();
    ids.sort();
    ids.first().map(|s| s.to_string())
}

fn linked_source(graph: &Value, node_id: &str, input_name: &str) -> Option<String> {
    let link = graph.get(node_id)?.get("inputs")?.get(input_name)?.as_array()?;
    let id = link.first()?;
    id.as_str().map(str::to_string).or_else(|| id.as_i64().map(|n| n.to_string()))
}

fn has_text_input(graph: &Value, node_id: &str) -> bool {
    graph
        .get(node_id)
        .and_then(|n| n.get("inputs"))
        .and_then(|i| i.get("text"))
        .is_some()
}

fn set_node_text(graph: &mut Value, node_id: &str, text: &str) -> bool {
    match graph.get_mut(node_id).and_then(|n| n.get_mut("inputs")).and_then(|i| i.as_object_mut()) {
        Some(inputs) => {
            inputs.insert("text".to_string(), Value::String(text.to_string()));
            true
        }
        None => false,
    }
}

fn collect_text_encode_ids(graph: &Value) -> Vec<String> {
    let mut ids: Vec<String> = graph
        .as_object()
        .into_iter()
        .flat_map(|o| o.iter())
        .filter(|(_, node)| {
            node.get("class_type")
                .and_then(|ct| ct.as_str())
                .is_some_and(|ct| ct.starts_with("CLIPTextEncode"))
        })
        .map(|(id, _)| id.clone())
        .collect();
    ids.sort();
    ids
}
