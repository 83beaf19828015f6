//! Model capabilities, their intersection across selected models, and
//! clamping of requested parameters into the allowed sets.

use crate::catalog::ModelDescriptor;
use serde::{Deserialize, Serialize};
use splice_core::{Result, SpliceError};
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Parameters one generation model accepts.
///
/// Loaded from the model catalog and never mutated at runtime. An enumerated
/// axis (aspect ratio, resolution, duration) carries its allowed set and a
/// default; the other axes are plain on/off flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    #[serde(default)]
    pub supports_aspect_ratio: bool,
    #[serde(default)]
    pub supports_resolution: bool,
    #[serde(default)]
    pub supports_duration: bool,
    #[serde(default)]
    pub supports_negative_prompt: bool,
    #[serde(default)]
    pub supports_prompt_expansion: bool,
    #[serde(default)]
    pub supports_seed: bool,
    #[serde(default)]
    pub supports_safety_checker: bool,
    #[serde(default)]
    pub supported_aspect_ratios: BTreeSet<String>,
    #[serde(default)]
    pub supported_resolutions: BTreeSet<String>,
    /// Durations in seconds
    #[serde(default)]
    pub supported_durations: BTreeSet<u32>,
    #[serde(default)]
    pub default_aspect_ratio: Option<String>,
    #[serde(default)]
    pub default_resolution: Option<String>,
    #[serde(default)]
    pub default_duration: Option<u32>,
}

impl ModelCapabilities {
    /// Check internal consistency of a catalog entry
    pub fn validate(&self) -> std::result::Result<(), String> {
        check_axis(
            "aspect_ratio",
            self.supports_aspect_ratio,
            &self.supported_aspect_ratios,
            self.default_aspect_ratio.as_ref(),
        )?;
        check_axis(
            "resolution",
            self.supports_resolution,
            &self.supported_resolutions,
            self.default_resolution.as_ref(),
        )?;
        check_axis(
            "duration",
            self.supports_duration,
            &self.supported_durations,
            self.default_duration.as_ref(),
        )
    }
}

fn check_axis<T: Ord + std::fmt::Debug>(
    axis: &str,
    supported: bool,
    allowed: &BTreeSet<T>,
    default: Option<&T>,
) -> std::result::Result<(), String> {
    if !supported {
        if !allowed.is_empty() || default.is_some() {
            return Err(format!("{} values given but supports_{} is false", axis, axis));
        }
        return Ok(());
    }
    if allowed.is_empty() {
        return Err(format!("supports_{} is true but no values are allowed", axis));
    }
    match default {
        Some(d) if allowed.contains(d) => Ok(()),
        Some(d) => Err(format!("default {} {:?} is not an allowed value", axis, d)),
        None => Err(format!("supports_{} is true but no default is set", axis)),
    }
}

/// Parameters jointly valid across every selected model.
///
/// An empty selection yields all flags false and all sets empty with
/// `generation_enabled == false`; callers must show no controls rather than
/// fall back to some model's values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedCapabilities {
    pub generation_enabled: bool,
    pub capabilities: ModelCapabilities,
}

/// Intersect the capabilities of the selected models.
///
/// Pure and order-independent: flags are ANDed, allowed sets intersected.
/// An enumerated axis whose intersection is empty is disabled. The combined
/// default is the shared default when every model agrees, otherwise the
/// smallest allowed value.
pub fn combine(models: &[&ModelCapabilities]) -> CombinedCapabilities {
    let Some((first, rest)) = models.split_first() else {
        return CombinedCapabilities::default();
    };

    let all = |flag: fn(&ModelCapabilities) -> bool| flag(first) && rest.iter().all(|m| flag(m));

    let (supports_aspect_ratio, supported_aspect_ratios, default_aspect_ratio) = combine_axis(
        models,
        |m| m.supports_aspect_ratio,
        |m| &m.supported_aspect_ratios,
        |m| m.default_aspect_ratio.as_ref(),
    );
    let (supports_resolution, supported_resolutions, default_resolution) = combine_axis(
        models,
        |m| m.supports_resolution,
        |m| &m.supported_resolutions,
        |m| m.default_resolution.as_ref(),
    );
    let (supports_duration, supported_durations, default_duration) = combine_axis(
        models,
        |m| m.supports_duration,
        |m| &m.supported_durations,
        |m| m.default_duration.as_ref(),
    );

    CombinedCapabilities {
        generation_enabled: true,
        capabilities: ModelCapabilities {
            supports_aspect_ratio,
            supports_resolution,
            supports_duration,
            supports_negative_prompt: all(|m| m.supports_negative_prompt),
            supports_prompt_expansion: all(|m| m.supports_prompt_expansion),
            supports_seed: all(|m| m.supports_seed),
            supports_safety_checker: all(|m| m.supports_safety_checker),
            supported_aspect_ratios,
            supported_resolutions,
            supported_durations,
            default_aspect_ratio,
            default_resolution,
            default_duration,
        },
    }
}

fn combine_axis<T: Ord + Clone>(
    models: &[&ModelCapabilities],
    supported: impl Fn(&ModelCapabilities) -> bool,
    allowed: impl Fn(&ModelCapabilities) -> &BTreeSet<T>,
    default: impl Fn(&ModelCapabilities) -> Option<&T>,
) -> (bool, BTreeSet<T>, Option<T>) {
    if !models.iter().all(|m| supported(m)) {
        return (false, BTreeSet::new(), None);
    }

    let mut sets = models.iter().map(|m| allowed(m));
    let Some(first) = sets.next() else {
        return (false, BTreeSet::new(), None);
    };
    let intersection: BTreeSet<T> = sets.fold(first.clone(), |acc, set| {
        acc.intersection(set).cloned().collect()
    });
    if intersection.is_empty() {
        return (false, intersection, None);
    }

    let defaults: Vec<Option<&T>> = models.iter().map(|m| default(m)).collect();
    let shared = match defaults.first() {
        Some(Some(d)) if defaults.iter().all(|x| *x == Some(*d)) && intersection.contains(*d) => {
            Some((*d).clone())
        }
        _ => None,
    };
    let chosen = shared.or_else(|| intersection.iter().next().cloned());
    (true, intersection, chosen)
}

/// Raw values from the UI, before clamping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub prompt_expansion: Option<bool>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub safety_checker: Option<bool>,
}

/// One model's sanitized request, ready for the transport layer.
///
/// Serializes to the flat payload the generation service expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    #[serde(skip)]
    pub model_id: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(rename = "enable_prompt_expansion", skip_serializing_if = "Option::is_none")]
    pub prompt_expansion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(rename = "enable_safety_checker", skip_serializing_if = "Option::is_none")]
    pub safety_checker: Option<bool>,
}

impl GenerationRequest {
    /// JSON payload for the service
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "prompt": self.prompt }))
    }
}

/// Build the request for `model`, clamping every enumerated value into the
/// combined allowed set.
///
/// Runs immediately before dispatch so stale UI state can never push an
/// out-of-range value upstream. A value that still falls outside the
/// model's own set is a validation error and nothing is sent.
pub fn sanitize(
    model: &ModelDescriptor,
    combined: &CombinedCapabilities,
    params: &GenerationParams,
) -> Result<GenerationRequest> {
    let prompt = params.prompt.trim();
    if prompt.is_empty() {
        return Err(SpliceError::ValidationError("prompt is empty".to_string()));
    }
    if !combined.generation_enabled {
        return Err(SpliceError::ValidationError(
            "no generation model selected".to_string(),
        ));
    }
    let caps = &combined.capabilities;

    let request = GenerationRequest {
        model_id: model.id.clone(),
        prompt: prompt.to_string(),
        aspect_ratio: caps
            .supports_aspect_ratio
            .then(|| {
                clamp_choice(
                    params.aspect_ratio.as_ref(),
                    &caps.supported_aspect_ratios,
                    caps.default_aspect_ratio.as_ref(),
                )
            })
            .flatten(),
        resolution: caps
            .supports_resolution
            .then(|| {
                clamp_choice(
                    params.resolution.as_ref(),
                    &caps.supported_resolutions,
                    caps.default_resolution.as_ref(),
                )
            })
            .flatten(),
        duration: caps
            .supports_duration
            .then(|| {
                clamp_nearest(
                    params.duration,
                    &caps.supported_durations,
                    caps.default_duration,
                )
            })
            .flatten(),
        negative_prompt: caps
            .supports_negative_prompt
            .then(|| {
                params
                    .negative_prompt
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .flatten(),
        prompt_expansion: caps
            .supports_prompt_expansion
            .then_some(params.prompt_expansion)
            .flatten(),
        seed: caps.supports_seed.then_some(params.seed).flatten(),
        safety_checker: caps
            .supports_safety_checker
            .then_some(params.safety_checker)
            .flatten(),
    };

    check_against_model(&model.capabilities, &request).map_err(|msg| {
        SpliceError::ValidationError(format!("{} for model '{}'", msg, model.id))
    })?;
    Ok(request)
}

/// Keep `desired` when allowed, else use the default
fn clamp_choice(
    desired: Option<&String>,
    allowed: &BTreeSet<String>,
    default: Option<&String>,
) -> Option<String> {
    match desired {
        Some(value) if allowed.contains(value) => Some(value.clone()),
        _ => default
            .filter(|d| allowed.contains(*d))
            .or_else(|| allowed.iter().next())
            .cloned(),
    }
}

/// Keep `desired` when allowed, else the nearest allowed value (ties go up)
fn clamp_nearest(desired: Option<u32>, allowed: &BTreeSet<u32>, default: Option<u32>) -> Option<u32> {
    match desired {
        Some(value) => allowed
            .iter()
            .copied()
            .min_by_key(|v| (v.abs_diff(value), Reverse(*v))),
        None => default
            .filter(|d| allowed.contains(d))
            .or_else(|| allowed.iter().next().copied()),
    }
}

fn check_against_model(
    caps: &ModelCapabilities,
    request: &GenerationRequest,
) -> std::result::Result<(), String> {
    if let Some(v) = &request.aspect_ratio {
        if !caps.supported_aspect_ratios.contains(v) {
            return Err(format!("aspect ratio {} is not supported", v));
        }
    }
    if let Some(v) = &request.resolution {
        if !caps.supported_resolutions.contains(v) {
            return Err(format!("resolution {} is not supported", v));
        }
    }
    if let Some(v) = request.duration {
        if !caps.supported_durations.contains(&v) {
            return Err(format!("duration {}s is not supported", v));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_media::MediaType;

    fn video_caps(durations: &[u32], ratios: &[&str], default_duration: u32) -> ModelCapabilities {
        ModelCapabilities {
            supports_aspect_ratio: true,
            supports_duration: true,
            supports_seed: true,
            supports_negative_prompt: true,
            supported_aspect_ratios: ratios.iter().map(|s| s.to_string()).collect(),
            supported_durations: durations.iter().copied().collect(),
            default_aspect_ratio: Some(ratios[0].to_string()),
            default_duration: Some(default_duration),
            ..Default::default()
        }
    }

    fn descriptor(id: &str, caps: ModelCapabilities) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            provider: "fal".to_string(),
            endpoint: format!("https://queue.example.com/{}", id),
            media: MediaType::Video,
            capabilities: caps,
        }
    }

    #[test]
    fn test_combine_empty_disables_everything() {
        let combined = combine(&[]);
        assert!(!combined.generation_enabled);
        assert_eq!(combined.capabilities, ModelCapabilities::default());
    }

    #[test]
    fn test_combine_single_model_is_identity() {
        let m = video_caps(&[4, 8, 12], &["16:9", "9:16"], 8);
        let combined = combine(&[&m]);
        assert!(combined.generation_enabled);
        assert_eq!(combined.capabilities, m);
    }

    #[test]
    fn test_combine_intersects_sets_and_ands_flags() {
        let a = video_caps(&[4, 8, 12], &["16:9", "9:16", "1:1"], 4);
        let mut b = video_caps(&[8, 10], &["16:9", "1:1"], 10);
        b.supports_seed = false;

        let combined = combine(&[&a, &b]).capabilities;
        assert_eq!(combined.supported_durations, BTreeSet::from([8]));
        assert_eq!(combined.default_duration, Some(8));
        assert_eq!(
            combined.supported_aspect_ratios,
            BTreeSet::from(["16:9".to_string(), "1:1".to_string()])
        );
        assert_eq!(combined.default_aspect_ratio.as_deref(), Some("16:9"));
        assert!(!combined.supports_seed);
        assert!(combined.supports_negative_prompt);
    }

    #[test]
    fn test_combine_disjoint_axis_is_disabled() {
        let a = video_caps(&[5], &["16:9"], 5);
        let b = video_caps(&[6], &["16:9"], 6);
        let combined = combine(&[&a, &b]).capabilities;
        assert!(!combined.supports_duration);
        assert!(combined.supported_durations.is_empty());
        assert_eq!(combined.default_duration, None);
    }

    #[test]
    fn test_combine_is_commutative_and_associative() {
        let a = video_caps(&[4, 6, 8, 10], &["16:9", "9:16", "1:1"], 6);
        let b = video_caps(&[6, 8, 10], &["16:9", "1:1"], 6);
        let mut c = video_caps(&[6, 10], &["1:1", "16:9"], 10);
        c.supports_negative_prompt = false;

        let abc = combine(&[&a, &b, &c]);
        for order in [[&a, &c, &b], [&b, &a, &c], [&b, &c, &a], [&c, &a, &b], [&c, &b, &a]] {
            assert_eq!(combine(&order), abc);
        }

        let ab = combine(&[&a, &b]).capabilities;
        let bc = combine(&[&b, &c]).capabilities;
        assert_eq!(combine(&[&ab, &c]), abc);
        assert_eq!(combine(&[&a, &bc]), abc);
    }

    #[test]
    fn test_duration_clamped_to_only_shared_value() {
        let veo = descriptor("veo", video_caps(&[4, 8], &["16:9"], 4));
        let kling = descriptor("kling", video_caps(&[8, 10], &["16:9"], 10));
        let combined = combine(&[&veo.capabilities, &kling.capabilities]);
        let params = GenerationParams {
            prompt: "a lighthouse at dusk".to_string(),
            duration: Some(6),
            ..Default::default()
        };

        for model in [&veo, &kling] {
            let request = sanitize(model, &combined, &params).unwrap();
            assert_eq!(request.duration, Some(8));
        }
    }

    #[test]
    fn test_nearest_duration_tie_goes_up() {
        let allowed = BTreeSet::from([4, 8]);
        assert_eq!(clamp_nearest(Some(6), &allowed, Some(4)), Some(8));
        assert_eq!(clamp_nearest(Some(5), &allowed, Some(8)), Some(4));
        assert_eq!(clamp_nearest(None, &allowed, Some(8)), Some(8));
        assert_eq!(clamp_nearest(Some(100), &allowed, None), Some(8));
    }

    #[test]
    fn test_dispatched_values_always_in_model_set() {
        let a = descriptor("a", video_caps(&[5, 10], &["16:9", "9:16"], 5));
        let b = descriptor("b", video_caps(&[4, 5, 6, 10], &["9:16", "1:1"], 6));
        let combined = combine(&[&a.capabilities, &b.capabilities]);

        for duration in 0..20 {
            for ratio in ["16:9", "9:16", "1:1", "4:3", ""] {
                let params = GenerationParams {
                    prompt: "x".to_string(),
                    duration: Some(duration),
                    aspect_ratio: Some(ratio.to_string()),
                    ..Default::default()
                };
                for model in [&a, &b] {
                    let request = sanitize(model, &combined, &params).unwrap();
                    let d = request.duration.unwrap();
                    assert!(model.capabilities.supported_durations.contains(&d));
                    let r = request.aspect_ratio.unwrap();
                    assert!(model.capabilities.supported_aspect_ratios.contains(&r));
                }
            }
        }
    }

    #[test]
    fn test_disabled_axes_are_not_sent() {
        let mut caps = video_caps(&[5], &["16:9"], 5);
        caps.supports_seed = false;
        caps.supports_negative_prompt = false;
        let model = descriptor("m", caps);
        let combined = combine(&[&model.capabilities]);
        let params = GenerationParams {
            prompt: "  dunes  ".to_string(),
            seed: Some(7),
            negative_prompt: Some("blur".to_string()),
            resolution: Some("1080p".to_string()),
            ..Default::default()
        };

        let request = sanitize(&model, &combined, &params).unwrap();
        assert_eq!(request.prompt, "dunes");
        assert_eq!(request.seed, None);
        assert_eq!(request.negative_prompt, None);
        assert_eq!(request.resolution, None);

        let payload = request.payload();
        assert!(payload.get("seed").is_none());
        assert!(payload.get("model_id").is_none());
        assert_eq!(payload["duration"], 5);
    }

    #[test]
    fn test_empty_prompt_and_empty_selection_rejected() {
        let model = descriptor("m", video_caps(&[5], &["16:9"], 5));
        let combined = combine(&[&model.capabilities]);
        assert!(sanitize(&model, &combined, &GenerationParams::default()).is_err());

        let params = GenerationParams {
            prompt: "x".to_string(),
            ..Default::default()
        };
        assert!(sanitize(&model, &combine(&[]), &params).is_err());
    }

    #[test]
    fn test_validate_catalog_entry() {
        assert!(video_caps(&[5], &["16:9"], 5).validate().is_ok());
        assert!(video_caps(&[5], &["16:9"], 6).validate().is_err());

        let mut caps = ModelCapabilities::default();
        caps.supported_durations.insert(5);
        assert!(caps.validate().is_err());
    }
}
