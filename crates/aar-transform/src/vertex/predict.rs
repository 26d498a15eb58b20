use aar_protocol::gemini::predict::{
    EmbeddingInstance, EmbeddingPredictRequest, EmbeddingPrediction, ImagenInstance,
    ImagenParameters, ImagenPredictRequest, ImagenPrediction, PredictResponse,
};
use aar_protocol::openai::chat::types::Usage;
use aar_protocol::openai::embeddings::{
    EmbeddingData, EmbeddingListObjectType, EmbeddingObjectType, EmbeddingsRequest,
    EmbeddingsResponse,
};
use aar_protocol::openai::images::{ImageData, ImageGenerationRequest, ImageGenerationResponse};

use crate::error::{TransformError, TransformResult};

/// Supported Imagen aspect ratios as (label, width/height).
const ASPECT_RATIOS: [(&str, f64); 5] = [
    ("1:1", 1.0),
    ("16:9", 16.0 / 9.0),
    ("9:16", 9.0 / 16.0),
    ("4:3", 4.0 / 3.0),
    ("3:4", 3.0 / 4.0),
];

/// Build the Imagen `:predict` payload from a canonical image request.
pub fn adapt_image_request(request: &ImageGenerationRequest) -> ImagenPredictRequest {
    ImagenPredictRequest {
        instances: vec![ImagenInstance {
            prompt: request.prompt.clone(),
        }],
        parameters: ImagenParameters {
            sample_count: request.n.unwrap_or(1).max(1),
            aspect_ratio: Some(aspect_ratio_for_size(request.size.as_deref())),
        },
    }
}

/// The canonical `size` is `WxH`; Imagen takes the closest supported ratio.
fn aspect_ratio_for_size(size: Option<&str>) -> String {
    let Some((width, height)) = size.and_then(parse_size) else {
        return "1:1".to_string();
    };
    let ratio = width / height;
    ASPECT_RATIOS
        .iter()
        .min_by(|(_, a), (_, b)| {
            (a - ratio)
                .abs()
                .partial_cmp(&(b - ratio).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(label, _)| label.to_string())
        .unwrap_or_else(|| "1:1".to_string())
}

fn parse_size(size: &str) -> Option<(f64, f64)> {
    let (width, height) = size.split_once('x')?;
    let width: f64 = width.trim().parse().ok()?;
    let height: f64 = height.trim().parse().ok()?;
    (width > 0.0 && height > 0.0).then_some((width, height))
}

pub fn adapt_image_response(
    response: PredictResponse,
    created: i64,
) -> TransformResult<ImageGenerationResponse> {
    let mut data = Vec::new();
    for prediction in response.predictions {
        let prediction: ImagenPrediction = serde_json::from_value(prediction)
            .map_err(|err| TransformError::InvalidUpstream(err.to_string()))?;
        data.push(ImageData {
            b64_json: prediction.bytes_base64_encoded,
            url: None,
            revised_prompt: None,
        });
    }
    if data.is_empty() {
        return Err(TransformError::InvalidUpstream(
            "predict response contains no images".to_string(),
        ));
    }
    Ok(ImageGenerationResponse { created, data })
}

pub fn adapt_embeddings_request(request: &EmbeddingsRequest) -> EmbeddingPredictRequest {
    EmbeddingPredictRequest {
        instances: request
            .input
            .clone()
            .into_texts()
            .into_iter()
            .map(|content| EmbeddingInstance { content })
            .collect(),
    }
}

pub fn adapt_embeddings_response(
    response: PredictResponse,
    alias: &str,
) -> TransformResult<EmbeddingsResponse> {
    let mut data = Vec::new();
    let mut prompt_tokens = 0i64;
    for (index, prediction) in response.predictions.into_iter().enumerate() {
        let prediction: EmbeddingPrediction = serde_json::from_value(prediction)
            .map_err(|err| TransformError::InvalidUpstream(err.to_string()))?;
        if let Some(statistics) = &prediction.embeddings.statistics
            && let Some(count) = statistics.token_count
        {
            prompt_tokens += count;
        }
        data.push(EmbeddingData {
            object: EmbeddingObjectType::Embedding,
            index: index as i64,
            embedding: prediction.embeddings.values,
        });
    }
    if data.is_empty() {
        return Err(TransformError::InvalidUpstream(
            "predict response contains no embeddings".to_string(),
        ));
    }
    Ok(EmbeddingsResponse {
        object: EmbeddingListObjectType::List,
        data,
        model: alias.to_string(),
        usage: Usage::from_parts(prompt_tokens, 0, None),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aar_protocol::openai::embeddings::EmbeddingInput;
    use serde_json::json;

    fn image_request(n: Option<i64>, size: Option<&str>) -> ImageGenerationRequest {
        ImageGenerationRequest {
            prompt: "sunset".to_string(),
            model: Some("imagen-3.0-fast-generate-001".to_string()),
            n,
            size: size.map(str::to_string),
            quality: None,
            style: None,
            response_format: None,
            user: None,
        }
    }

    #[test]
    fn sample_count_defaults_to_one() {
        let out = adapt_image_request(&image_request(None, None));
        assert_eq!(out.parameters.sample_count, 1);
        assert_eq!(out.instances[0].prompt, "sunset");
    }

    #[test]
    fn size_maps_to_closest_aspect_ratio() {
        assert_eq!(aspect_ratio_for_size(Some("1024x1024")), "1:1");
        assert_eq!(aspect_ratio_for_size(Some("1792x1024")), "16:9");
        assert_eq!(aspect_ratio_for_size(Some("1024x1792")), "9:16");
        assert_eq!(aspect_ratio_for_size(Some("800x600")), "4:3");
        assert_eq!(aspect_ratio_for_size(Some("garbage")), "1:1");
        assert_eq!(aspect_ratio_for_size(None), "1:1");
    }

    #[test]
    fn predictions_become_b64_images() {
        let response = PredictResponse {
            predictions: vec![
                json!({"bytesBase64Encoded": "aW1n", "mimeType": "image/png"}),
                json!({"bytesBase64Encoded": "aW1nMg==", "mimeType": "image/png"}),
            ],
        };
        let out = adapt_image_response(response, 42).unwrap();
        assert_eq!(out.data.len(), 2);
        assert_eq!(out.data[0].b64_json.as_deref(), Some("aW1n"));
        assert_eq!(out.created, 42);
    }

    #[test]
    fn empty_predictions_error() {
        let response = PredictResponse {
            predictions: Vec::new(),
        };
        assert!(adapt_image_response(response, 0).is_err());
    }

    #[test]
    fn embeddings_round_into_openai_shape() {
        let request = EmbeddingsRequest {
            model: "gemini-embedding-001".to_string(),
            input: EmbeddingInput::Batch(vec!["a".to_string(), "b".to_string()]),
            dimensions: None,
            encoding_format: None,
            user: None,
        };
        let predict = adapt_embeddings_request(&request);
        assert_eq!(predict.instances.len(), 2);

        let response = PredictResponse {
            predictions: vec![
                json!({"embeddings": {"values": [0.1, 0.2], "statistics": {"tokenCount": 3}}}),
                json!({"embeddings": {"values": [0.3, 0.4], "statistics": {"tokenCount": 2}}}),
            ],
        };
        let out = adapt_embeddings_response(response, "gemini-embedding-001").unwrap();
        assert_eq!(out.data.len(), 2);
        assert_eq!(out.data[1].index, 1);
        assert_eq!(out.usage.prompt_tokens, 5);
        assert_eq!(out.usage.total_tokens, 5);
    }
}
