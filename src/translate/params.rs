//! URL parameter handling: query parsing, coercion and overlay onto the
//! input object.

use std::collections::HashSet;

use serde_json::{Map, Value as Json};

use crate::config::UnknownParamPolicy;
use crate::error::{GatewayError, GatewayResult};
use crate::routing::UrlParameter;
use crate::schema::json::{out_of_range, parse_bool, parse_integer, CodecError};
use crate::schema::{is_reserved_name, FieldDescriptor, FieldType, MessageDescriptor};

/// Decode `a=1&b=x%20y` into parameters, in order.
pub fn parse_query(query: &str) -> Vec<UrlParameter> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| UrlParameter::new(k, v))
        .collect()
}

/// Path parameters first; query parameters whose key a path parameter
/// already supplies are dropped.
pub fn merge_params(path: Vec<UrlParameter>, query: Vec<UrlParameter>) -> Vec<UrlParameter> {
    let path_keys: HashSet<String> = path.iter().map(|p| p.key.clone()).collect();
    let mut merged = path;
    merged.extend(query.into_iter().filter(|q| !path_keys.contains(&q.key)));
    merged
}

/// Coerce one raw parameter string to the JSON form of `field`'s element
/// type.
pub fn coerce_param(field: &FieldDescriptor, raw: &str) -> Result<Json, CodecError> {
    match &field.ty {
        FieldType::Bool => parse_bool(&field.name, raw).map(Json::Bool),
        FieldType::Int32 => {
            let n = parse_integer(field, raw)?;
            i32::try_from(n).map(Json::from).map_err(|_| out_of_range(field, n))
        }
        FieldType::UInt32 => {
            let n = parse_integer(field, raw)?;
            u32::try_from(n).map(Json::from).map_err(|_| out_of_range(field, n))
        }
        FieldType::Int64 => {
            let n = parse_integer(field, raw)?;
            i64::try_from(n)
                .map(|v| Json::String(v.to_string()))
                .map_err(|_| out_of_range(field, n))
        }
        FieldType::UInt64 => {
            let n = parse_integer(field, raw)?;
            u64::try_from(n)
                .map(|v| Json::String(v.to_string()))
                .map_err(|_| out_of_range(field, n))
        }
        FieldType::String => Ok(Json::String(raw.to_string())),
        FieldType::Enum(e) => {
            if e.number_of(raw).is_some() {
                return Ok(Json::String(raw.to_string()));
            }
            raw.parse::<i32>()
                .ok()
                .and_then(|n| e.name_of(n))
                .map(|name| Json::String(name.to_string()))
                .ok_or_else(|| CodecError::UnknownEnum {
                    field: field.name.clone(),
                    value: raw.to_string(),
                })
        }
        FieldType::Float | FieldType::Double | FieldType::Bytes | FieldType::Message(_) => {
            Err(CodecError::UnsupportedParameter {
                field: field.name.clone(),
                ty: field.ty.type_name(),
            })
        }
    }
}

/// Write every matching parameter into `object`, replacing body values.
///
/// Repeated fields collect every occurrence of their key, in order. Keys
/// naming no field follow `policy`; reserved keys are always rejected.
pub fn overlay(
    input: Option<&MessageDescriptor>,
    object: &mut Map<String, Json>,
    params: &[UrlParameter],
    policy: UnknownParamPolicy,
) -> GatewayResult<()> {
    let mut written: HashSet<&str> = HashSet::new();

    for param in params {
        if is_reserved_name(&param.key) {
            return Err(GatewayError::InvalidArgument(format!(
                "Parameter '{}' is reserved and may not be supplied.",
                param.key
            )));
        }

        let Some(field) = input.and_then(|d| d.field(&param.key)) else {
            match policy {
                UnknownParamPolicy::Ignore => {
                    tracing::trace!(key = %param.key, "Ignoring unmatched URL parameter");
                    continue;
                }
                UnknownParamPolicy::Reject => {
                    return Err(GatewayError::InvalidArgument(format!(
                        "Unknown parameter '{}'",
                        param.key
                    )));
                }
            }
        };

        let value = coerce_param(field, &param.value)?;
        if field.is_repeated() {
            let first = written.insert(param.key.as_str());
            match object.get_mut(&field.name) {
                Some(Json::Array(items)) if !first => items.push(value),
                _ => {
                    object.insert(field.name.clone(), Json::Array(vec![value]));
                }
            }
        } else {
            object.insert(field.name.clone(), value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumDescriptor, ReservedField};
    use serde_json::json;

    fn desc() -> MessageDescriptor {
        MessageDescriptor::builder("t.Query")
            .field("key_a", FieldType::String)
            .field("key_b", FieldType::String)
            .field("count", FieldType::UInt32)
            .field("big", FieldType::Int64)
            .field("flag", FieldType::Bool)
            .field("ratio", FieldType::Double)
            .field("mode", FieldType::Enum(EnumDescriptor::new("t.Mode", [("FAST", 0), ("SLOW", 1)])))
            .repeated("ids", FieldType::UInt32)
            .reserved(ReservedField::CallerIp)
            .build()
    }

    #[test]
    fn query_is_percent_decoded() {
        let params = parse_query("a=x%20y&b=1+2&c");
        assert_eq!(
            params,
            vec![
                UrlParameter::new("a", "x y"),
                UrlParameter::new("b", "1 2"),
                UrlParameter::new("c", ""),
            ]
        );
    }

    #[test]
    fn path_params_win_over_query() {
        let merged = merge_params(
            vec![UrlParameter::new("key_b", "CC"), UrlParameter::new("key_a", "AA")],
            vec![UrlParameter::new("key_a", "BB"), UrlParameter::new("extra", "1")],
        );
        assert_eq!(
            merged,
            vec![
                UrlParameter::new("key_b", "CC"),
                UrlParameter::new("key_a", "AA"),
                UrlParameter::new("extra", "1"),
            ]
        );
    }

    #[test]
    fn coerces_scalars() {
        let d = desc();
        assert_eq!(coerce_param(d.field("count").unwrap(), "42").unwrap(), json!(42));
        assert_eq!(coerce_param(d.field("big").unwrap(), "-7").unwrap(), json!("-7"));
        assert_eq!(coerce_param(d.field("flag").unwrap(), "true").unwrap(), json!(true));
        assert_eq!(coerce_param(d.field("mode").unwrap(), "SLOW").unwrap(), json!("SLOW"));
        assert_eq!(coerce_param(d.field("mode").unwrap(), "1").unwrap(), json!("SLOW"));
    }

    #[test]
    fn rejects_bad_coercions() {
        let d = desc();
        assert!(matches!(
            coerce_param(d.field("count").unwrap(), "-1"),
            Err(CodecError::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce_param(d.field("count").unwrap(), "abc"),
            Err(CodecError::TypeMismatch { .. })
        ));
        assert!(matches!(
            coerce_param(d.field("flag").unwrap(), "1"),
            Err(CodecError::InvalidBool { .. })
        ));
        assert!(matches!(
            coerce_param(d.field("ratio").unwrap(), "0.5"),
            Err(CodecError::UnsupportedParameter { .. })
        ));
        assert!(matches!(
            coerce_param(d.field("mode").unwrap(), "MEDIUM"),
            Err(CodecError::UnknownEnum { .. })
        ));
    }

    #[test]
    fn overlay_replaces_body_and_collects_repeated() {
        let d = desc();
        let mut object = json!({"key_a": "body", "ids": [9]}).as_object().unwrap().clone();
        overlay(
            Some(&d),
            &mut object,
            &[
                UrlParameter::new("key_a", "param"),
                UrlParameter::new("ids", "1"),
                UrlParameter::new("ids", "2"),
            ],
            UnknownParamPolicy::Ignore,
        )
        .unwrap();
        assert_eq!(Json::Object(object), json!({"key_a": "param", "ids": [1, 2]}));
    }

    #[test]
    fn unknown_params_follow_policy() {
        let d = desc();
        let params = [UrlParameter::new("nope", "1")];

        let mut object = Map::new();
        overlay(Some(&d), &mut object, &params, UnknownParamPolicy::Ignore).unwrap();
        assert!(object.is_empty());

        let err = overlay(Some(&d), &mut object, &params, UnknownParamPolicy::Reject).unwrap_err();
        assert_eq!(err.to_string(), "Unknown parameter 'nope'");
    }

    #[test]
    fn reserved_params_rejected() {
        let d = desc();
        let mut object = Map::new();
        let err = overlay(
            Some(&d),
            &mut object,
            &[UrlParameter::new("_caller_ip", "1.2.3.4")],
            UnknownParamPolicy::Ignore,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }
}
