//! Mode-change requests arriving from the control surface.
//!
//! A request is a JSON object with exactly one recognized field populated:
//!
//! ```text
//! {"stop": true}
//! {"image": "heart"}
//! {"ball": "red"}
//! {"scroll": {"text": "hi", "color": "blue", "size": 8, "font": "Arial", "speed": 2}}
//! {"plasma": true}
//! {"power": "shutdown" | "reboot"}
//! {"rotate": 30}
//! ```
//!
//! Anything else is rejected before the scheduler touches its state.

use std::time::Duration;

use embedded_graphics::pixelcolor::Rgb888;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::color;

/// Shortest rotation interval a timer can honour.
const MIN_ROTATE_INTERVAL: Duration = Duration::from_millis(1);

pub const FIELDS: [&str; 7] = ["stop", "image", "ball", "scroll", "plasma", "power", "rotate"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("request must be a JSON object")]
    NotAnObject,

    #[error("request has no recognized field")]
    Empty,

    #[error("request has more than one recognized field: {}", .0.join(", "))]
    Ambiguous(Vec<&'static str>),

    #[error("invalid '{field}' value: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Shutdown,
    Reboot,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScrollSpec {
    pub color: Rgb888,
    pub text: String,
    pub size: u32,
    pub font: String,
    pub speed: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModeRequest {
    Stop,
    Image(String),
    Ball(Rgb888),
    Scroll(ScrollSpec),
    Plasma,
    Power(PowerAction),
    Rotate(Duration),
}

impl ModeRequest {
    pub fn from_json(value: &Value) -> Result<Self, RequestError> {
        let object = value.as_object().ok_or(RequestError::NotAnObject)?;
        let populated: Vec<&'static str> = FIELDS
            .iter()
            .copied()
            .filter(|field| object.get(*field).is_some_and(is_populated))
            .collect();

        match populated.as_slice() {
            [] => Err(RequestError::Empty),
            [field] => Self::parse_field(*field, &object[*field]),
            _ => Err(RequestError::Ambiguous(populated)),
        }
    }

    pub fn is_rotation(&self) -> bool {
        matches!(self, Self::Rotate(_))
    }

    fn parse_field(field: &'static str, value: &Value) -> Result<Self, RequestError> {
        let invalid = |reason: &str| RequestError::InvalidField {
            field,
            reason: reason.to_string(),
        };

        match field {
            "stop" => Ok(Self::Stop),
            "plasma" => Ok(Self::Plasma),
            "image" => match value.as_str().map(str::trim) {
                Some(name) if !name.is_empty() => Ok(Self::Image(name.to_string())),
                _ => Err(invalid("expected an animation name")),
            },
            "ball" => {
                let name = value.as_str().ok_or_else(|| invalid("expected a color"))?;
                color::parse_css(name)
                    .map(Self::Ball)
                    .ok_or_else(|| invalid("unrecognized color"))
            }
            "scroll" => parse_scroll(value).map(Self::Scroll),
            "power" => PowerAction::deserialize(value)
                .map(Self::Power)
                .map_err(|_| invalid("expected \"shutdown\" or \"reboot\"")),
            "rotate" => number(value)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .filter(|interval| *interval >= MIN_ROTATE_INTERVAL)
                .map(Self::Rotate)
                .ok_or_else(|| invalid("expected a number of seconds, at least 0.001")),
            _ => Err(RequestError::Empty),
        }
    }
}

fn is_populated(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// Number, or a string holding one. Form-based clients send strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_scroll(value: &Value) -> Result<ScrollSpec, RequestError> {
    let invalid = |reason: String| RequestError::InvalidField {
        field: "scroll",
        reason,
    };
    let empty = Map::new();
    let object = match value {
        Value::Object(object) => object,
        Value::String(_) => &empty,
        _ => return Err(invalid("expected an object".to_string())),
    };

    let text = match (value, object.get("text")) {
        (Value::String(text), _) => text.clone(),
        (_, Some(Value::String(text))) => text.clone(),
        (_, Some(Value::Number(n))) => n.to_string(),
        _ => return Err(invalid("missing text".to_string())),
    };

    let color = match object.get("color").and_then(Value::as_str) {
        Some(name) => color::parse_css(name)
            .ok_or_else(|| invalid(format!("unrecognized color '{name}'")))?,
        None => Rgb888::new(0, 0, 255),
    };
    let size = match object.get("size") {
        Some(size) => number(size)
            .filter(|s| *s >= 1.0)
            .ok_or_else(|| invalid("size must be a positive number".to_string()))?
            as u32,
        None => 8,
    };
    let font = object
        .get("font")
        .and_then(Value::as_str)
        .unwrap_or("Arial")
        .to_string();
    let speed = match object.get("speed") {
        Some(speed) => number(speed)
            .filter(|s| s.is_finite() && *s >= 0.0)
            .ok_or_else(|| invalid("speed must be a non-negative number".to_string()))?
            as f32,
        None => 2.0,
    };

    Ok(ScrollSpec {
        color,
        text,
        size,
        font,
        speed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::RgbColor;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(value: Value) -> Result<ModeRequest, RequestError> {
        ModeRequest::from_json(&value)
    }

    #[test]
    fn single_fields() {
        assert_eq!(parse(json!({"stop": true})), Ok(ModeRequest::Stop));
        assert_eq!(parse(json!({"plasma": 1})), Ok(ModeRequest::Plasma));
        assert_eq!(
            parse(json!({"image": "heart"})),
            Ok(ModeRequest::Image("heart".to_string()))
        );
        assert_eq!(
            parse(json!({"ball": "red"})),
            Ok(ModeRequest::Ball(Rgb888::RED))
        );
        assert_eq!(
            parse(json!({"power": "reboot"})),
            Ok(ModeRequest::Power(PowerAction::Reboot))
        );
        assert_eq!(
            parse(json!({"rotate": "30"})),
            Ok(ModeRequest::Rotate(Duration::from_secs(30)))
        );
    }

    #[test]
    fn scroll_defaults() {
        let request = parse(json!({"scroll": {"text": "hi"}})).unwrap();
        assert_eq!(
            request,
            ModeRequest::Scroll(ScrollSpec {
                color: Rgb888::BLUE,
                text: "hi".to_string(),
                size: 8,
                font: "Arial".to_string(),
                speed: 2.0,
            })
        );
    }

    #[test]
    fn scroll_accepts_string_numbers() {
        let request =
            parse(json!({"scroll": {"text": "yo", "size": "10", "speed": "4", "color": "lime"}}))
                .unwrap();
        let ModeRequest::Scroll(spec) = request else {
            panic!("expected scroll");
        };
        assert_eq!(spec.size, 10);
        assert_eq!(spec.speed, 4.0);
        assert_eq!(spec.color, Rgb888::GREEN);
    }

    #[test]
    fn empty_and_unknown_requests_are_rejected() {
        assert_eq!(parse(json!({})), Err(RequestError::Empty));
        assert_eq!(parse(json!({"dance": true})), Err(RequestError::Empty));
        assert_eq!(parse(json!({"stop": false, "ball": null})), Err(RequestError::Empty));
        assert_eq!(parse(json!("stop")), Err(RequestError::NotAnObject));
    }

    #[test]
    fn multiple_fields_are_ambiguous() {
        assert_eq!(
            parse(json!({"stop": true, "ball": "red"})),
            Err(RequestError::Ambiguous(vec!["stop", "ball"]))
        );
    }

    #[test]
    fn unknown_keys_next_to_a_field_are_ignored() {
        assert_eq!(
            parse(json!({"plasma": true, "client": "web"})),
            Ok(ModeRequest::Plasma)
        );
    }

    #[test]
    fn rotate_interval_must_fit_a_timer() {
        for value in [
            json!(1e20),
            json!("NaN"),
            json!("inf"),
            json!(-5),
            json!(1e-12),
            json!("0.0001"),
        ] {
            assert!(
                matches!(
                    parse(json!({"rotate": value.clone()})),
                    Err(RequestError::InvalidField { field: "rotate", .. })
                ),
                "rotate = {value}"
            );
        }
        assert_eq!(
            parse(json!({"rotate": 0.001})),
            Ok(ModeRequest::Rotate(Duration::from_millis(1)))
        );
    }

    #[test]
    fn negative_scroll_speed_is_rejected() {
        assert!(matches!(
            parse(json!({"scroll": {"text": "hi", "speed": -1}})),
            Err(RequestError::InvalidField { field: "scroll", .. })
        ));
        let request = parse(json!({"scroll": {"text": "hi", "speed": 0}})).unwrap();
        assert!(matches!(request, ModeRequest::Scroll(ScrollSpec { speed, .. }) if speed == 0.0));
    }

    #[test]
    fn invalid_values() {
        assert!(matches!(
            parse(json!({"power": "hibernate"})),
            Err(RequestError::InvalidField { field: "power", .. })
        ));
        assert!(matches!(
            parse(json!({"rotate": 0})),
            Err(RequestError::InvalidField { field: "rotate", .. })
        ));
        assert!(matches!(
            parse(json!({"ball": "blurple"})),
            Err(RequestError::InvalidField { field: "ball", .. })
        ));
        assert!(matches!(
            parse(json!({"scroll": {"color": "red"}})),
            Err(RequestError::InvalidField { field: "scroll", .. })
        ));
        assert!(matches!(
            parse(json!({"image": ""})),
            Err(RequestError::InvalidField { field: "image", .. })
        ));
    }
}
