#![forbid(unsafe_code)]

use serde_json::{Value, json};
use weft_storage::{Storage, StoreError};

use crate::auth::Credentials;
use crate::dto::{MessageDto, SettingsDto, ThreadDto};
use crate::support::{
    AUTH_REQUIRED, INVALID_PARAMS, JsonRpcRequest, METHOD_NOT_FOUND, NOT_FOUND, STORAGE_FAULT,
    SessionLog, json_rpc_error, json_rpc_response,
};

const SERVER_NAME: &str = "weft-server";

pub(crate) struct Server {
    store: Box<dyn Storage>,
    credentials: Option<Credentials>,
    authenticated: bool,
    log: SessionLog,
}

impl Server {
    pub(crate) fn new(
        store: Box<dyn Storage>,
        credentials: Option<Credentials>,
        log: SessionLog,
    ) -> Self {
        Self {
            store,
            credentials,
            authenticated: false,
            log,
        }
    }

    pub(crate) fn handle(&mut self, request: JsonRpcRequest) -> Value {
        let method = request.method.clone();
        let response = self.dispatch(request);
        let outcome = if response.get("error").is_some() { "err" } else { "ok" };
        self.log.record(&method, outcome);
        response
    }

    fn dispatch(&mut self, request: JsonRpcRequest) -> Value {
        let JsonRpcRequest { method, id, params, .. } = request;
        let method = method.as_str();

        if method == "ping" {
            return json_rpc_response(id, json!({}));
        }
        if method == "version" {
            return json_rpc_response(
                id,
                json!({ "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") }),
            );
        }
        if method == "auth/login" {
            return self.login(id, params);
        }

        if self.credentials.is_some() && !self.authenticated {
            return json_rpc_error(id, AUTH_REQUIRED, "authentication required");
        }

        match method {
            "threads/list" => match self.store.list_threads() {
                Ok(threads) => {
                    let dtos: Vec<ThreadDto> =
                        threads.into_iter().map(ThreadDto::from_record).collect();
                    json_rpc_response(id, json!({ "threads": dtos }))
                }
                Err(err) => storage_error(id, err),
            },
            "threads/get" => {
                let Some(thread_id) = param_str(params.as_ref(), "id") else {
                    return json_rpc_error(id, INVALID_PARAMS, "id must be a string");
                };
                match self.store.get_thread(&thread_id) {
                    Ok(Some(thread)) => {
                        json_rpc_response(id, json!({ "thread": ThreadDto::from_record(thread) }))
                    }
                    Ok(None) => json_rpc_error(id, NOT_FOUND, "thread not found"),
                    Err(err) => storage_error(id, err),
                }
            }
            "threads/create" => {
                let Some(dto) = param_as::<ThreadDto>(params) else {
                    return json_rpc_error(id, INVALID_PARAMS, "params must be a thread object");
                };
                let record = dto.into_record();
                match self.store.create_thread(&record) {
                    Ok(()) => {
                        json_rpc_response(id, json!({ "thread": ThreadDto::from_record(record) }))
                    }
                    Err(err) => storage_error(id, err),
                }
            }
            "threads/update" => {
                let Some(dto) = param_as::<ThreadDto>(params) else {
                    return json_rpc_error(id, INVALID_PARAMS, "params must be a thread object");
                };
                if dto.id.is_empty() {
                    return json_rpc_error(id, INVALID_PARAMS, "id must not be empty");
                }
                let record = dto.into_record();
                match self.store.update_thread(&record) {
                    Ok(()) => {
                        json_rpc_response(id, json!({ "thread": ThreadDto::from_record(record) }))
                    }
                    Err(err) => storage_error(id, err),
                }
            }
            "threads/delete" => {
                let Some(thread_id) = param_str(params.as_ref(), "id") else {
                    return json_rpc_error(id, INVALID_PARAMS, "id must be a string");
                };
                match self.store.delete_thread(&thread_id) {
                    Ok(()) => json_rpc_response(id, json!({ "deleted": thread_id })),
                    Err(err) => storage_error(id, err),
                }
            }
            "messages/list" => {
                let Some(thread_id) = param_str(params.as_ref(), "thread_id") else {
                    return json_rpc_error(id, INVALID_PARAMS, "thread_id must be a string");
                };
                match self.store.list_messages(&thread_id) {
                    Ok(messages) => {
                        let dtos: Vec<MessageDto> =
                            messages.into_iter().map(MessageDto::from_record).collect();
                        json_rpc_response(id, json!({ "messages": dtos }))
                    }
                    Err(err) => storage_error(id, err),
                }
            }
            "messages/get" => {
                let Some(message_id) = param_str(params.as_ref(), "id") else {
                    return json_rpc_error(id, INVALID_PARAMS, "id must be a string");
                };
                match self.store.get_message(&message_id) {
                    Ok(Some(message)) => json_rpc_response(
                        id,
                        json!({ "message": MessageDto::from_record(message) }),
                    ),
                    Ok(None) => json_rpc_error(id, NOT_FOUND, "message not found"),
                    Err(err) => storage_error(id, err),
                }
            }
            "messages/create" => {
                let Some(dto) = param_as::<MessageDto>(params) else {
                    return json_rpc_error(id, INVALID_PARAMS, "params must be a message object");
                };
                let record = dto.into_record();
                match self.store.create_message(&record) {
                    Ok(()) => json_rpc_response(
                        id,
                        json!({ "message": MessageDto::from_record(record) }),
                    ),
                    Err(err) => storage_error(id, err),
                }
            }
            "messages/delete" => {
                let Some(message_id) = param_str(params.as_ref(), "id") else {
                    return json_rpc_error(id, INVALID_PARAMS, "id must be a string");
                };
                match self.store.delete_message(&message_id) {
                    Ok(()) => json_rpc_response(id, json!({ "deleted": message_id })),
                    Err(err) => storage_error(id, err),
                }
            }
            "messages/branch" => {
                let Some(message_id) = param_str(params.as_ref(), "id") else {
                    return json_rpc_error(id, INVALID_PARAMS, "id must be a string");
                };
                match self.store.move_subtree(&message_id) {
                    Ok(new_thread_id) => {
                        json_rpc_response(id, json!({ "thread_id": new_thread_id }))
                    }
                    Err(err) => storage_error(id, err),
                }
            }
            "settings/get" => match self.store.get_settings() {
                Ok(settings) => json_rpc_response(
                    id,
                    json!({ "settings": SettingsDto::from_record_redacted(settings) }),
                ),
                Err(err) => storage_error(id, err),
            },
            "settings/update" => {
                let Some(dto) = param_as::<SettingsDto>(params) else {
                    return json_rpc_error(id, INVALID_PARAMS, "params must be a settings object");
                };
                let record = dto.into_record();
                match self.store.update_settings(&record) {
                    Ok(()) => json_rpc_response(
                        id,
                        json!({ "settings": SettingsDto::from_record_redacted(record) }),
                    ),
                    Err(err) => storage_error(id, err),
                }
            }
            _ => json_rpc_error(id, METHOD_NOT_FOUND, "unknown method"),
        }
    }

    fn login(&mut self, id: Option<Value>, params: Option<Value>) -> Value {
        let Some(credentials) = self.credentials.as_ref() else {
            // No credential file configured: the surface is open.
            self.authenticated = true;
            return json_rpc_response(id, json!({ "authenticated": true }));
        };
        let username = param_str(params.as_ref(), "username");
        let password = param_str(params.as_ref(), "password");
        let (Some(username), Some(password)) = (username, password) else {
            return json_rpc_error(id, INVALID_PARAMS, "username and password must be strings");
        };
        if credentials.verify(&username, &password) {
            self.authenticated = true;
            json_rpc_response(id, json!({ "authenticated": true }))
        } else {
            json_rpc_error(id, AUTH_REQUIRED, "invalid credentials")
        }
    }
}

fn storage_error(id: Option<Value>, err: StoreError) -> Value {
    let code = match err {
        StoreError::MessageNotFound | StoreError::UnknownThread => NOT_FOUND,
        StoreError::InvalidInput(_) | StoreError::ParentCycle => INVALID_PARAMS,
        StoreError::Io(_) | StoreError::Sql(_) => STORAGE_FAULT,
    };
    json_rpc_error(id, code, &err.to_string())
}

fn param_str(params: Option<&Value>, key: &str) -> Option<String> {
    params?
        .as_object()?
        .get(key)?
        .as_str()
        .map(str::to_string)
}

fn param_as<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Option<T> {
    serde_json::from_value(params?).ok()
}
