//! HTTP request → RPC input.
//!
//! # Pipeline
//! ```text
//!  1. route lookup (verb, path)              miss → unimplemented
//!  2. authorization hook                      reject → unavailable
//!  3. body presence vs body spec              → invalid_argument
//!  4. JSON parse, reserved-key check          → invalid_argument
//!  5. URL parameter overlay (path over query) → invalid_argument
//!  6. caller identity / upload name injection
//!  7. raw file body binding
//!  8. stream allocation (guarded)
//!  9. client resolution                       missing → internal
//! 10. JSON → Message                          → invalid_argument
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value as Json};

use crate::config::UnknownParamPolicy;
use crate::error::{
    GatewayError, GatewayResult, MSG_INPUT_EXPECTED, MSG_NO_INPUT_EXPECTED, MSG_OBJECT_EXPECTED,
};
use crate::routing::{BodySpec, HttpVerb, LookupError, RoutingTree};
use crate::rpc::registry::ClientRegistry;
use crate::schema::json::decode_message;
use crate::schema::{is_reserved_name, Message, MessageDescriptor, ReservedField, Value};
use crate::streaming::StreamManager;
use crate::translate::params::{merge_params, overlay, parse_query};
use crate::translate::{AuthRequest, GatewayRequest, RequestAuthorizer, RequestContext};

/// Borrowed view of the gateway state a translation needs.
pub struct RequestTranslator<'a> {
    pub tree: &'a RoutingTree,
    pub clients: &'a ClientRegistry,
    pub streams: &'a Arc<StreamManager>,
    pub authorizer: Option<&'a dyn RequestAuthorizer>,
    pub unknown_params: UnknownParamPolicy,
}

fn invalid(message: impl Into<String>) -> GatewayError {
    GatewayError::InvalidArgument(message.into())
}

/// Whitespace-only bodies count as absent.
fn body_present(body: &Bytes) -> bool {
    !body.iter().all(u8::is_ascii_whitespace)
}

fn parse_json(body: &Bytes) -> GatewayResult<Json> {
    let json: Json = serde_json::from_slice(body).map_err(|e| invalid(format!("Invalid JSON: {e}")))?;
    reject_reserved(&json)?;
    Ok(json)
}

/// Reject any object key, at any depth, that names a reserved field.
fn reject_reserved(json: &Json) -> GatewayResult<()> {
    match json {
        Json::Object(object) => {
            for (key, value) in object {
                if is_reserved_name(key) {
                    return Err(invalid(format!(
                        "Invalid JSON: Field '{key}' is reserved and may not be supplied."
                    )));
                }
                reject_reserved(value)?;
            }
            Ok(())
        }
        Json::Array(items) => items.iter().try_for_each(reject_reserved),
        _ => Ok(()),
    }
}

/// Apply the body spec to the raw body, producing the initial input object.
fn body_object(spec: &BodySpec, input: &MessageDescriptor, body: &Bytes) -> GatewayResult<Map<String, Json>> {
    let present = body_present(body);
    match spec {
        BodySpec::None => {
            if present {
                return Err(invalid(MSG_NO_INPUT_EXPECTED));
            }
            Ok(Map::new())
        }
        BodySpec::Field(name) => {
            if !present {
                return Err(invalid(MSG_INPUT_EXPECTED));
            }
            let field = input.field(name).ok_or_else(|| {
                GatewayError::Internal(format!(
                    "Body field '{name}' is not declared by {}",
                    input.full_name()
                ))
            })?;
            let mut object = Map::new();
            object.insert(field.name.clone(), parse_json(body)?);
            Ok(object)
        }
        BodySpec::Whole => {
            let mut functional = input.functional_fields();
            if let (Some(only), None) = (functional.next(), functional.next()) {
                if !present {
                    return Err(invalid(MSG_INPUT_EXPECTED));
                }
                let mut object = Map::new();
                object.insert(only.name.clone(), parse_json(body)?);
                return Ok(object);
            }
            if !present {
                return Ok(Map::new());
            }
            match parse_json(body)? {
                Json::Object(object) => Ok(object),
                _ => Err(invalid(MSG_OBJECT_EXPECTED)),
            }
        }
    }
}

fn inject_identity(input: &MessageDescriptor, object: &mut Map<String, Json>, req: &GatewayRequest) {
    let mut put = |field: ReservedField, value: Option<String>| {
        if let (true, Some(value)) = (input.has_reserved(field), value) {
            object.insert(field.name().to_string(), Json::String(value));
        }
    };
    put(ReservedField::CallerIp, req.caller.ip.map(|ip| ip.to_string()));
    put(ReservedField::CallerUsername, req.caller.username.clone());
    put(ReservedField::Filename, req.upload.as_ref().map(|u| u.filename.clone()));
}

impl RequestTranslator<'_> {
    /// Run the request half of the pipeline.
    pub fn translate(&self, req: &GatewayRequest) -> GatewayResult<(RequestContext, Option<Message>)> {
        let verb = HttpVerb::from_method(&req.method)
            .ok_or_else(|| GatewayError::Unimplemented(format!("Method {} is not supported", req.method)))?;

        let route = self.tree.lookup(verb, &req.path).map_err(|e| {
            match e {
                LookupError::NotFound => tracing::debug!(%verb, path = %req.path, "No route"),
                LookupError::VerbNotBound => {
                    tracing::debug!(%verb, path = %req.path, "Path is routed but not for this verb")
                }
            }
            GatewayError::Unimplemented(format!("No route for {verb} {}", req.path))
        })?;
        let binding = route.binding;

        if let Some(authorizer) = self.authorizer {
            let auth = AuthRequest {
                path: &req.path,
                binding: &binding,
                caller: &req.caller,
            };
            authorizer.authorize(verb, &auth).map_err(|reason| {
                tracing::info!(%verb, path = %req.path, %reason, "Request rejected by authorizer");
                GatewayError::Unavailable(reason)
            })?;
        }

        let query = req.query.as_deref().map(parse_query).unwrap_or_default();
        let params = merge_params(route.params, query);

        let Some(input) = binding.input() else {
            if body_present(&req.body) {
                return Err(invalid(MSG_NO_INPUT_EXPECTED));
            }
            overlay(None, &mut Map::new(), &params, self.unknown_params)?;
            let client = self.resolve_client(binding.service())?;
            let context = RequestContext {
                verb,
                binding,
                client,
                raw_file_input: false,
                stream: None,
            };
            return Ok((context, None));
        };

        let raw_file_input = input.has_reserved(ReservedField::RawFile);
        let mut object = if raw_file_input {
            Map::new()
        } else {
            body_object(&binding.body, input, &req.body)?
        };

        overlay(Some(input), &mut object, &params, self.unknown_params)?;
        inject_identity(input, &mut object, req);

        let stream = input.has_reserved(ReservedField::StreamId).then(|| {
            let guard = self.streams.reserve(req.connection, binding.output().cloned());
            object.insert(
                ReservedField::StreamId.name().to_string(),
                Json::String(guard.id().to_string()),
            );
            guard
        });

        let client = self.resolve_client(binding.service())?;

        let mut message = decode_message(input, &Json::Object(object))?;
        if raw_file_input {
            message.set(ReservedField::RawFile.name(), Value::Bytes(req.body.clone()))?;
        }

        let context = RequestContext {
            verb,
            binding,
            client,
            raw_file_input,
            stream,
        };
        Ok((context, Some(message)))
    }

    fn resolve_client(&self, service: &str) -> GatewayResult<crate::rpc::ClientHandle> {
        self.clients.get_or_create(service).ok_or_else(|| {
            tracing::error!(service, "No client available");
            GatewayError::Internal(format!("No client available for service {service}"))
        })
    }
}
