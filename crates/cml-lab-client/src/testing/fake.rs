//! In-memory controller.
//!
//! Serves the REST surface the client consumes from a small stateful model:
//! labs, nodes, interfaces, links, users, groups and a static directory. Node state
//! changes follow the controller's rules (start from DEFINED or STOPPED,
//! wipe only when stopped, delete only when wiped) and answer 409 otherwise.

use std::collections::BTreeMap;

use async_trait::async_trait;
use cml_lab_core::State;
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// Id of the pre-seeded `admin` user, owner of every lab.
pub const ADMIN_ID: &str = "00000000-0000-4000-a000-000000000001";

/// Token handed out by `/authenticate`.
pub const FAKE_TOKEN: &str = "secret";

type Reply = (StatusCode, Value);

#[derive(Debug, Clone)]
struct FakeNode {
    id: String,
    label: String,
    node_definition: String,
    image_definition: Option<String>,
    configuration: Option<String>,
    tags: Vec<String>,
    x: i64,
    y: i64,
    state: State,
}

#[derive(Debug, Clone)]
struct FakeInterface {
    id: String,
    node: String,
    slot: u32,
    kind: &'static str,
}

#[derive(Debug, Clone)]
struct FakeLink {
    id: String,
    node_a: String,
    interface_a: String,
    node_b: String,
    interface_b: String,
}

#[derive(Debug, Clone)]
struct FakeLab {
    id: String,
    title: String,
    description: String,
    notes: String,
    nodes: BTreeMap<String, FakeNode>,
    interfaces: BTreeMap<String, FakeInterface>,
    links: BTreeMap<String, FakeLink>,
    pending_checks: usize,
}

impl FakeLab {
    fn state(&self) -> State {
        if self.nodes.values().any(|n| n.state.is_active()) {
            State::Started
        } else if self.nodes.values().any(|n| n.state == State::Stopped) {
            State::Stopped
        } else {
            State::Defined
        }
    }

    fn is_connected(&self, interface: &str) -> bool {
        self.links
            .values()
            .any(|l| l.interface_a == interface || l.interface_b == interface)
    }

    fn node_state(&self, node: &str) -> State {
        self.nodes.get(node).map_or(State::Defined, |n| n.state)
    }
}

#[derive(Default)]
struct FakeState {
    labs: BTreeMap<String, FakeLab>,
    users: BTreeMap<String, Value>,
    groups: BTreeMap<String, Value>,
    next_id: u64,
    converge_delay: usize,
    credentials: Option<(String, String)>,
    failures: Vec<(Method, String, StatusCode)>,
}

impl FakeState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:04}", self.next_id)
    }
}

/// A stateful stand-in for a CML controller.
pub struct FakeController {
    version: String,
    state: Mutex<FakeState>,
    journal: Mutex<Vec<ApiRequest>>,
}

impl Default for FakeController {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeController {
    /// A controller running version 2.4.0 that accepts any request.
    #[must_use]
    pub fn new() -> Self {
        let mut state = FakeState::default();
        state.users.insert(
            ADMIN_ID.to_string(),
            json!({
                "id": ADMIN_ID, "username": "admin", "fullname": "Administrator",
                "description": "", "email": "", "admin": true, "groups": [],
                "resource_pool": null
            }),
        );
        Self {
            version: "2.4.0".to_string(),
            state: Mutex::new(state),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Report another version from `/system_information`.
    #[must_use]
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Require a bearer token obtained from `/authenticate` with these
    /// credentials.
    #[must_use]
    pub fn with_credentials(self, username: &str, password: &str) -> Self {
        self.state.lock().credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// After every state change, answer `check_if_converged` with `false`
    /// this many times.
    pub fn set_converge_delay(&self, polls: usize) {
        self.state.lock().converge_delay = polls;
    }

    /// Answer every `method path` request with `status` from now on.
    pub fn fail(&self, method: Method, path: &str, status: u16) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.state
            .lock()
            .failures
            .push((method, path.to_string(), status));
    }

    /// Create a lab with nodes given as `(label, tags)`. Each node gets two
    /// physical interfaces. Returns the lab id.
    pub fn seed_lab(&self, title: &str, nodes: &[(&str, &[&str])]) -> String {
        let mut state = self.state.lock();
        let lab_id = state.id("lab-");
        let mut lab = FakeLab {
            id: lab_id.clone(),
            title: title.to_string(),
            description: String::new(),
            notes: String::new(),
            nodes: BTreeMap::new(),
            interfaces: BTreeMap::new(),
            links: BTreeMap::new(),
            pending_checks: 0,
        };
        for (label, tags) in nodes {
            let node = FakeNode {
                id: state.id("n-"),
                label: (*label).to_string(),
                node_definition: "alpine".to_string(),
                image_definition: None,
                configuration: None,
                tags: tags.iter().map(|t| (*t).to_string()).collect(),
                x: 0,
                y: 0,
                state: State::Defined,
            };
            for slot in 0..2 {
                let id = state.id("i-");
                lab.interfaces.insert(
                    id.clone(),
                    FakeInterface {
                        id,
                        node: node.id.clone(),
                        slot,
                        kind: "physical",
                    },
                );
            }
            lab.nodes.insert(node.id.clone(), node);
        }
        state.labs.insert(lab_id.clone(), lab);
        lab_id
    }

    /// Connect the first free interfaces of two nodes, by label.
    pub fn seed_link(&self, lab_id: &str, a: &str, b: &str) -> Option<String> {
        let mut state = self.state.lock();
        let link_id = state.id("l-");
        let lab = state.labs.get_mut(lab_id)?;
        let free = |lab: &FakeLab, label: &str| -> Option<(String, String)> {
            let node = lab.nodes.values().find(|n| n.label == label)?;
            let iface = lab
                .interfaces
                .values()
                .filter(|i| i.node == node.id && !lab.is_connected(&i.id))
                .min_by_key(|i| i.slot)?;
            Some((node.id.clone(), iface.id.clone()))
        };
        let (node_a, interface_a) = free(lab, a)?;
        let (node_b, interface_b) = free(lab, b)?;
        lab.links.insert(
            link_id.clone(),
            FakeLink {
                id: link_id.clone(),
                node_a,
                interface_a,
                node_b,
                interface_b,
            },
        );
        Some(link_id)
    }

    /// Force the state of every node of a lab.
    pub fn set_lab_state(&self, lab_id: &str, state: State) {
        if let Some(lab) = self.state.lock().labs.get_mut(lab_id) {
            for node in lab.nodes.values_mut() {
                node.state = state;
            }
        }
    }

    /// Force the state of one node, by label.
    pub fn set_node_state(&self, lab_id: &str, label: &str, state: State) {
        if let Some(node) = self
            .state
            .lock()
            .labs
            .get_mut(lab_id)
            .and_then(|lab| lab.nodes.values_mut().find(|n| n.label == label))
        {
            node.state = state;
        }
    }

    /// Lab state as the controller would report it.
    #[must_use]
    pub fn lab_state(&self, lab_id: &str) -> Option<State> {
        self.state.lock().labs.get(lab_id).map(FakeLab::state)
    }

    /// Returns true if the lab exists.
    #[must_use]
    pub fn has_lab(&self, lab_id: &str) -> bool {
        self.state.lock().labs.contains_key(lab_id)
    }

    /// Id of the only lab with `title`.
    #[must_use]
    pub fn lab_id_by_title(&self, title: &str) -> Option<String> {
        self.state
            .lock()
            .labs
            .values()
            .find(|l| l.title == title)
            .map(|l| l.id.clone())
    }

    /// Startup configuration of a node, by label.
    #[must_use]
    pub fn node_configuration(&self, lab_id: &str, label: &str) -> Option<String> {
        self.state
            .lock()
            .labs
            .get(lab_id)
            .and_then(|lab| lab.nodes.values().find(|n| n.label == label))
            .and_then(|n| n.configuration.clone())
    }

    /// State of a node, by label.
    #[must_use]
    pub fn node_state(&self, lab_id: &str, label: &str) -> Option<State> {
        self.state
            .lock()
            .labs
            .get(lab_id)
            .and_then(|lab| lab.nodes.values().find(|n| n.label == label))
            .map(|n| n.state)
    }

    /// All requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.journal.lock().clone()
    }

    /// `"METHOD /path"` of every request that is not a `GET`.
    #[must_use]
    pub fn mutations(&self) -> Vec<String> {
        self.journal
            .lock()
            .iter()
            .filter(|r| r.method != Method::GET)
            .map(|r| format!("{} {}", r.method, r.api_path()))
            .collect()
    }

    /// Number of requests received for a route.
    #[must_use]
    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|r| r.method == *method && r.api_path() == path)
            .count()
    }

    fn handle(&self, request: &ApiRequest) -> Reply {
        let path = request.api_path().to_string();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let body: Value = request
            .body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
            .unwrap_or(Value::Null);

        let mut state = self.state.lock();

        if let Some((_, _, status)) = state
            .failures
            .iter()
            .find(|(m, p, _)| *m == request.method && *p == path)
        {
            return error(*status, "injected failure");
        }

        match (&request.method, segments.as_slice()) {
            (&Method::GET, ["system_information"]) => (
                StatusCode::OK,
                json!({"version": self.version, "ready": true}),
            ),
            (&Method::POST, ["authenticate"]) => authenticate(&state, &body),
            _ if state.credentials.is_some()
                && request.bearer_token() != Some(FAKE_TOKEN) =>
            {
                error(StatusCode::UNAUTHORIZED, "No authorization token provided.")
            }
            (&Method::GET, ["auth_test"]) => (StatusCode::OK, json!("OK")),
            (&Method::POST, ["import"]) => import(&mut state, request),
            (_, ["labs", ..]) => route_labs(&mut state, &request.method, &segments[1..], &body),
            (_, ["users", ..]) => route_users(&mut state, &request.method, &segments[1..], &body),
            (_, ["groups", ..]) => route_groups(&mut state, &request.method, &segments[1..], &body),
            (&Method::GET, ["image_definitions"]) => (
                StatusCode::OK,
                json!([{"id": "alpine-3-16", "node_definition_id": "alpine", "label": "Alpine 3.16"}]),
            ),
            (&Method::GET, ["image_definitions", id]) if *id == "alpine-3-16" => (
                StatusCode::OK,
                json!({"id": "alpine-3-16", "node_definition_id": "alpine", "label": "Alpine 3.16"}),
            ),
            (&Method::GET, ["simplified_node_definitions"]) => (
                StatusCode::OK,
                json!([{"id": "alpine", "image_definitions": ["alpine-3-16"], "ui": {"label": "Alpine"}}]),
            ),
            (&Method::GET, ["system", "external_connectors"]) => (
                StatusCode::OK,
                json!([{"id": "ec-nat", "label": "NAT", "device_name": "virbr0"}]),
            ),
            _ => not_found(&path),
        }
    }
}

fn error(status: StatusCode, description: &str) -> Reply {
    (
        status,
        json!({"code": status.as_u16(), "description": description}),
    )
}

fn not_found(what: &str) -> Reply {
    error(StatusCode::NOT_FOUND, &format!("Not found: {what}"))
}

fn no_content() -> Reply {
    (StatusCode::NO_CONTENT, Value::Null)
}

fn authenticate(state: &FakeState, body: &Value) -> Reply {
    let given = (
        body.get("username").and_then(Value::as_str),
        body.get("password").and_then(Value::as_str),
    );
    match &state.credentials {
        Some((user, pass)) if given != (Some(user.as_str()), Some(pass.as_str())) => {
            error(StatusCode::FORBIDDEN, "Authentication failed!")
        }
        _ => (StatusCode::OK, json!(FAKE_TOKEN)),
    }
}

fn lab_json(lab: &FakeLab) -> Value {
    json!({
        "id": lab.id,
        "state": lab.state(),
        "created": "2022-10-25T10:00:00+00:00",
        "modified": "2022-10-25T10:00:00+00:00",
        "lab_title": lab.title,
        "lab_description": lab.description,
        "lab_notes": lab.notes,
        "owner": ADMIN_ID,
        "node_count": lab.nodes.len(),
        "link_count": lab.links.len(),
        "groups": []
    })
}

fn node_json(lab: &FakeLab, node: &FakeNode) -> Value {
    let running = node.state.is_active();
    json!({
        "id": node.id,
        "lab_id": lab.id,
        "label": node.label,
        "node_definition": node.node_definition,
        "image_definition": node.image_definition,
        "configuration": node.configuration,
        "x": node.x,
        "y": node.y,
        "tags": node.tags,
        "state": node.state,
        "compute_id": running.then_some("compute-1"),
    })
}

fn interface_json(lab: &FakeLab, iface: &FakeInterface) -> Value {
    json!({
        "id": iface.id,
        "node": iface.node,
        "label": format!("eth{}", iface.slot),
        "slot": iface.slot,
        "type": iface.kind,
        "state": lab.node_state(&iface.node),
        "mac_address": mac(iface),
        "is_connected": lab.is_connected(&iface.id),
    })
}

fn mac(iface: &FakeInterface) -> String {
    let n: u32 = iface.id.trim_start_matches("i-").parse().unwrap_or_default();
    format!("52:54:00:00:{:02x}:{:02x}", (n >> 8) & 0xff, n & 0xff)
}

fn link_json(lab: &FakeLab, link: &FakeLink) -> Value {
    let state = if lab.node_state(&link.node_a).is_active() && lab.node_state(&link.node_b).is_active() {
        State::Started
    } else {
        lab.node_state(&link.node_a)
    };
    json!({
        "id": link.id,
        "lab_id": lab.id,
        "interface_a": link.interface_a,
        "interface_b": link.interface_b,
        "node_a": link.node_a,
        "node_b": link.node_b,
        "state": state,
    })
}

fn layer3_json(lab: &FakeLab) -> Value {
    let mut out = serde_json::Map::new();
    for (index, node) in lab.nodes.values().enumerate() {
        if !node.state.is_active() {
            continue;
        }
        let mut interfaces = serde_json::Map::new();
        for iface in lab.interfaces.values().filter(|i| i.node == node.id) {
            interfaces.insert(
                mac(iface),
                json!({
                    "id": iface.id,
                    "label": format!("eth{}", iface.slot),
                    "ip4": [format!("192.0.2.{}", index * 10 + iface.slot as usize + 1)],
                    "ip6": null,
                }),
            );
        }
        out.insert(
            node.id.clone(),
            json!({"name": node.label, "interfaces": interfaces}),
        );
    }
    Value::Object(out)
}

fn touch(state: &mut FakeState, lab_id: &str) {
    let delay = state.converge_delay;
    if let Some(lab) = state.labs.get_mut(lab_id) {
        lab.pending_checks = delay;
    }
}

fn route_labs(state: &mut FakeState, method: &Method, rest: &[&str], body: &Value) -> Reply {
    match (method, rest) {
        (&Method::GET, []) => (StatusCode::OK, json!(state.labs.keys().collect::<Vec<_>>())),
        (&Method::POST, []) => {
            let id = state.id("lab-");
            let lab = FakeLab {
                id: id.clone(),
                title: str_field(body, "title").unwrap_or_else(|| format!("Lab {id}")),
                description: str_field(body, "description").unwrap_or_default(),
                notes: str_field(body, "notes").unwrap_or_default(),
                nodes: BTreeMap::new(),
                interfaces: BTreeMap::new(),
                links: BTreeMap::new(),
                pending_checks: 0,
            };
            let reply = (StatusCode::OK, lab_json(&lab));
            state.labs.insert(id, lab);
            reply
        }
        (_, [lab_id, tail @ ..]) => {
            let lab_id = (*lab_id).to_string();
            if !state.labs.contains_key(&lab_id) {
                return error(StatusCode::NOT_FOUND, &format!("Lab not found: {lab_id}"));
            }
            route_lab(state, method, &lab_id, tail, body)
        }
        _ => not_found("labs"),
    }
}

#[allow(clippy::too_many_lines)]
fn route_lab(state: &mut FakeState, method: &Method, lab_id: &str, rest: &[&str], body: &Value) -> Reply {
    let Some(lab) = state.labs.get(lab_id) else {
        return not_found(lab_id);
    };

    match (method, rest) {
        (&Method::GET, []) => (StatusCode::OK, lab_json(lab)),
        (&Method::PATCH, []) => {
            let lab = state.labs.get_mut(lab_id).map(|lab| {
                if let Some(title) = str_field(body, "title") {
                    lab.title = title;
                }
                if let Some(description) = str_field(body, "description") {
                    lab.description = description;
                }
                if let Some(notes) = str_field(body, "notes") {
                    lab.notes = notes;
                }
                lab_json(lab)
            });
            lab.map_or_else(|| not_found(lab_id), |l| (StatusCode::OK, l))
        }
        (&Method::DELETE, []) => {
            if lab.state() != State::Defined {
                return error(StatusCode::CONFLICT, "Lab is not wiped");
            }
            state.labs.remove(lab_id);
            no_content()
        }
        (&Method::PUT, ["start"]) => {
            set_states(state, lab_id, |s| !s.is_active(), State::Booted);
            no_content()
        }
        (&Method::PUT, ["stop"]) => {
            set_states(state, lab_id, State::is_active, State::Stopped);
            no_content()
        }
        (&Method::PUT, ["wipe"]) => {
            if lab.nodes.values().any(|n| n.state.is_active()) {
                return error(StatusCode::CONFLICT, "Lab has running nodes");
            }
            set_states(state, lab_id, |s| s == State::Stopped, State::Defined);
            no_content()
        }
        (&Method::GET, ["check_if_converged"]) => {
            let lab = state.labs.get_mut(lab_id);
            let converged = lab.map_or(true, |lab| {
                if lab.pending_checks > 0 {
                    lab.pending_checks -= 1;
                    false
                } else {
                    true
                }
            });
            (StatusCode::OK, json!(converged))
        }
        (&Method::GET, ["layer3_addresses"]) => (StatusCode::OK, layer3_json(lab)),
        (&Method::GET, ["topology"]) => (
            StatusCode::OK,
            json!({
                "lab": {"title": lab.title, "description": lab.description, "notes": lab.notes},
                "nodes": lab.nodes.values().map(|n| node_json(lab, n)).collect::<Vec<_>>(),
                "links": lab.links.values().map(|l| link_json(lab, l)).collect::<Vec<_>>(),
            }),
        ),
        (&Method::GET, ["nodes"]) => (StatusCode::OK, json!(lab.nodes.keys().collect::<Vec<_>>())),
        (&Method::POST, ["nodes"]) => create_node(state, lab_id, body),
        (_, ["nodes", node_id, tail @ ..]) => {
            let node_id = (*node_id).to_string();
            if !lab.nodes.contains_key(&node_id) {
                return error(StatusCode::NOT_FOUND, &format!("Node not found: {node_id}"));
            }
            route_node(state, method, lab_id, &node_id, tail, body)
        }
        (&Method::GET, ["interfaces", iface_id]) => lab.interfaces.get(*iface_id).map_or_else(
            || not_found(iface_id),
            |i| (StatusCode::OK, interface_json(lab, i)),
        ),
        (&Method::POST, ["interfaces"]) => create_interfaces(state, lab_id, body),
        (&Method::GET, ["links"]) => (StatusCode::OK, json!(lab.links.keys().collect::<Vec<_>>())),
        (&Method::POST, ["links"]) => create_link(state, lab_id, body),
        (&Method::GET, ["links", link_id]) => lab.links.get(*link_id).map_or_else(
            || not_found(link_id),
            |l| (StatusCode::OK, link_json(lab, l)),
        ),
        (&Method::DELETE, ["links", link_id]) => {
            let removed = state
                .labs
                .get_mut(lab_id)
                .and_then(|lab| lab.links.remove(*link_id));
            removed.map_or_else(|| not_found(link_id), |_| no_content())
        }
        _ => not_found(&rest.join("/")),
    }
}

fn set_states(state: &mut FakeState, lab_id: &str, from: impl Fn(State) -> bool, to: State) {
    if let Some(lab) = state.labs.get_mut(lab_id) {
        for node in lab.nodes.values_mut().filter(|n| from(n.state)) {
            node.state = to;
        }
    }
    touch(state, lab_id);
}

fn route_node(
    state: &mut FakeState,
    method: &Method,
    lab_id: &str,
    node_id: &str,
    rest: &[&str],
    body: &Value,
) -> Reply {
    let Some(lab) = state.labs.get(lab_id) else {
        return not_found(lab_id);
    };
    let Some(node) = lab.nodes.get(node_id) else {
        return not_found(node_id);
    };
    let current = node.state;

    match (method, rest) {
        (&Method::GET, []) => (StatusCode::OK, node_json(lab, node)),
        (&Method::GET, ["interfaces"]) => {
            let mut ids: Vec<(u32, String)> = lab
                .interfaces
                .values()
                .filter(|i| i.node == node_id)
                .map(|i| (i.slot, i.id.clone()))
                .collect();
            ids.sort();
            (
                StatusCode::OK,
                json!(ids.into_iter().map(|(_, id)| id).collect::<Vec<_>>()),
            )
        }
        (&Method::PATCH, []) => {
            let touches_definition =
                body.get("configuration").is_some() || body.get("image_definition").is_some();
            if touches_definition && current != State::Defined {
                return error(StatusCode::BAD_REQUEST, "Node must be wiped first");
            }
            if let Some(node) = state
                .labs
                .get_mut(lab_id)
                .and_then(|lab| lab.nodes.get_mut(node_id))
            {
                if let Some(config) = str_field(body, "configuration") {
                    node.configuration = Some(config);
                }
                if let Some(image) = str_field(body, "image_definition") {
                    node.image_definition = Some(image);
                }
                if let Some(label) = str_field(body, "label") {
                    node.label = label;
                }
                if let Some(tags) = body.get("tags").and_then(Value::as_array) {
                    node.tags = tags
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                }
            }
            (StatusCode::OK, json!(node_id))
        }
        (&Method::DELETE, []) => {
            if current != State::Defined {
                return error(StatusCode::CONFLICT, "Node is not wiped");
            }
            if let Some(lab) = state.labs.get_mut(lab_id) {
                lab.nodes.remove(node_id);
                lab.interfaces.retain(|_, i| i.node != node_id);
                lab.links
                    .retain(|_, l| l.node_a != node_id && l.node_b != node_id);
            }
            no_content()
        }
        (&Method::PUT, ["state", "start"]) => {
            if current.is_active() {
                return error(StatusCode::CONFLICT, "Node is already running");
            }
            set_node(state, lab_id, node_id, State::Booted);
            no_content()
        }
        (&Method::PUT, ["state", "stop"]) => {
            if current.is_active() {
                set_node(state, lab_id, node_id, State::Stopped);
            }
            no_content()
        }
        (&Method::PUT, ["wipe_disks"]) => {
            if current.is_active() {
                return error(StatusCode::CONFLICT, "Node is running");
            }
            set_node(state, lab_id, node_id, State::Defined);
            no_content()
        }
        _ => not_found(&rest.join("/")),
    }
}

fn set_node(state: &mut FakeState, lab_id: &str, node_id: &str, to: State) {
    if let Some(node) = state
        .labs
        .get_mut(lab_id)
        .and_then(|lab| lab.nodes.get_mut(node_id))
    {
        node.state = to;
    }
    touch(state, lab_id);
}

fn str_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

fn add_interfaces(state: &mut FakeState, lab_id: &str, node_id: &str, up_to: u32) -> Vec<String> {
    let existing: Vec<u32> = state
        .labs
        .get(lab_id)
        .map(|lab| {
            lab.interfaces
                .values()
                .filter(|i| i.node == node_id)
                .map(|i| i.slot)
                .collect()
        })
        .unwrap_or_default();

    let mut created = Vec::new();
    for slot in 0..=up_to {
        if existing.contains(&slot) {
            continue;
        }
        let id = state.id("i-");
        if let Some(lab) = state.labs.get_mut(lab_id) {
            lab.interfaces.insert(
                id.clone(),
                FakeInterface {
                    id: id.clone(),
                    node: node_id.to_string(),
                    slot,
                    kind: "physical",
                },
            );
        }
        created.push(id);
    }
    created
}

fn create_node(state: &mut FakeState, lab_id: &str, body: &Value) -> Reply {
    let (Some(label), Some(definition)) = (str_field(body, "label"), str_field(body, "node_definition")) else {
        return error(StatusCode::BAD_REQUEST, "label and node_definition are required");
    };
    let id = state.id("n-");
    let node = FakeNode {
        id: id.clone(),
        label,
        node_definition: definition,
        image_definition: str_field(body, "image_definition"),
        configuration: str_field(body, "configuration"),
        tags: body
            .get("tags")
            .and_then(Value::as_array)
            .map(|t| t.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        x: body.get("x").and_then(Value::as_i64).unwrap_or_default(),
        y: body.get("y").and_then(Value::as_i64).unwrap_or_default(),
        state: State::Defined,
    };
    if let Some(lab) = state.labs.get_mut(lab_id) {
        lab.nodes.insert(id.clone(), node);
    }
    add_interfaces(state, lab_id, &id, 1);
    (StatusCode::OK, json!({"id": id}))
}

fn create_interfaces(state: &mut FakeState, lab_id: &str, body: &Value) -> Reply {
    let Some(node_id) = str_field(body, "node") else {
        return error(StatusCode::BAD_REQUEST, "node is required");
    };
    let next_free = state.labs.get(lab_id).map_or(0, |lab| {
        lab.interfaces
            .values()
            .filter(|i| i.node == node_id)
            .map(|i| i.slot + 1)
            .max()
            .unwrap_or(0)
    });
    let up_to = body
        .get("slot")
        .and_then(Value::as_u64)
        .and_then(|s| u32::try_from(s).ok())
        .unwrap_or(next_free);

    let created = add_interfaces(state, lab_id, &node_id, up_to);
    let Some(lab) = state.labs.get(lab_id) else {
        return not_found(lab_id);
    };
    let mut records: Vec<Value> = created
        .iter()
        .filter_map(|id| lab.interfaces.get(id))
        .map(|i| interface_json(lab, i))
        .collect();
    match records.len() {
        0 => error(StatusCode::BAD_REQUEST, "slot already exists"),
        1 => (StatusCode::OK, records.remove(0)),
        _ => (StatusCode::OK, Value::Array(records)),
    }
}

fn create_link(state: &mut FakeState, lab_id: &str, body: &Value) -> Reply {
    let (Some(src), Some(dst)) = (str_field(body, "src_int"), str_field(body, "dst_int")) else {
        return error(StatusCode::BAD_REQUEST, "src_int and dst_int are required");
    };
    let id = state.id("l-");
    let Some(lab) = state.labs.get_mut(lab_id) else {
        return not_found(lab_id);
    };
    let (Some(a), Some(b)) = (lab.interfaces.get(&src).cloned(), lab.interfaces.get(&dst).cloned()) else {
        return error(StatusCode::BAD_REQUEST, "unknown interface");
    };
    if lab.is_connected(&a.id) || lab.is_connected(&b.id) {
        return error(StatusCode::BAD_REQUEST, "interface already connected");
    }
    let link = FakeLink {
        id: id.clone(),
        node_a: a.node,
        interface_a: a.id,
        node_b: b.node,
        interface_b: b.id,
    };
    let reply = (StatusCode::OK, link_json(lab, &link));
    lab.links.insert(id, link);
    reply
}

fn route_users(state: &mut FakeState, method: &Method, rest: &[&str], body: &Value) -> Reply {
    match (method, rest) {
        (&Method::GET, []) => (
            StatusCode::OK,
            Value::Array(state.users.values().cloned().collect()),
        ),
        (&Method::POST, []) => {
            let id = format!("00000000-0000-4000-b000-{:012}", state.next_id + 1);
            state.next_id += 1;
            let mut record = json!({
                "id": id, "username": "", "fullname": "", "description": "",
                "email": "", "admin": false, "groups": [], "resource_pool": null
            });
            merge_fields(&mut record, body);
            state.users.insert(id, record.clone());
            (StatusCode::OK, record)
        }
        (&Method::GET, [id]) => state
            .users
            .get(*id)
            .map_or_else(|| not_found(id), |u| (StatusCode::OK, u.clone())),
        (&Method::PATCH, [id]) => match state.users.get_mut(*id) {
            Some(record) => {
                merge_fields(record, body);
                (StatusCode::OK, record.clone())
            }
            None => not_found(id),
        },
        (&Method::DELETE, [id]) => state
            .users
            .remove(*id)
            .map_or_else(|| not_found(id), |_| no_content()),
        _ => not_found("users"),
    }
}

fn route_groups(state: &mut FakeState, method: &Method, rest: &[&str], body: &Value) -> Reply {
    match (method, rest) {
        (&Method::GET, []) => (
            StatusCode::OK,
            Value::Array(state.groups.values().cloned().collect()),
        ),
        (&Method::POST, []) => {
            let Some(name) = str_field(body, "name") else {
                return error(StatusCode::BAD_REQUEST, "name is required");
            };
            if state.groups.values().any(|g| g["name"] == name.as_str()) {
                return error(StatusCode::CONFLICT, "Group name already exists");
            }
            let id = state.id("g-");
            let mut record = json!({
                "id": id, "name": name, "description": "", "members": [], "labs": []
            });
            merge_fields(&mut record, body);
            state.groups.insert(id, record.clone());
            (StatusCode::OK, record)
        }
        (&Method::GET, [id]) => state
            .groups
            .get(*id)
            .map_or_else(|| not_found(id), |g| (StatusCode::OK, g.clone())),
        (&Method::PATCH, [id]) => match state.groups.get_mut(*id) {
            Some(record) => {
                merge_fields(record, body);
                (StatusCode::OK, record.clone())
            }
            None => not_found(id),
        },
        (&Method::DELETE, [id]) => state
            .groups
            .remove(*id)
            .map_or_else(|| not_found(id), |_| no_content()),
        _ => not_found("groups"),
    }
}

fn merge_fields(record: &mut Value, body: &Value) {
    if let (Some(record), Some(body)) = (record.as_object_mut(), body.as_object()) {
        for (key, value) in body {
            if key != "password" {
                record.insert(key.clone(), value.clone());
            }
        }
    }
}

#[derive(Deserialize)]
struct Topology {
    #[serde(default)]
    lab: TopologyLab,
    #[serde(default)]
    nodes: Vec<TopologyNode>,
    #[serde(default)]
    links: Vec<TopologyLink>,
}

#[derive(Deserialize, Default)]
struct TopologyLab {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    notes: String,
}

#[derive(Deserialize)]
struct TopologyNode {
    id: String,
    label: String,
    node_definition: String,
    #[serde(default)]
    configuration: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    interfaces: Vec<TopologyInterface>,
}

#[derive(Deserialize)]
struct TopologyInterface {
    id: String,
    slot: u32,
}

#[derive(Deserialize)]
struct TopologyLink {
    n1: String,
    i1: String,
    n2: String,
    i2: String,
}

fn import(state: &mut FakeState, request: &ApiRequest) -> Reply {
    let Some(topology) = request
        .body
        .as_deref()
        .and_then(|b| serde_json::from_slice::<Topology>(b).ok())
    else {
        return error(StatusCode::BAD_REQUEST, "unsupported topology");
    };

    let lab_id = state.id("lab-");
    let mut lab = FakeLab {
        id: lab_id.clone(),
        title: topology
            .lab
            .title
            .unwrap_or_else(|| format!("Lab {lab_id}")),
        description: topology.lab.description,
        notes: topology.lab.notes,
        nodes: BTreeMap::new(),
        interfaces: BTreeMap::new(),
        links: BTreeMap::new(),
        pending_checks: 0,
    };

    let mut node_ids = BTreeMap::new();
    let mut iface_ids = BTreeMap::new();
    for spec in topology.nodes {
        let id = state.id("n-");
        node_ids.insert(spec.id.clone(), id.clone());
        let slots: Vec<(String, u32)> = if spec.interfaces.is_empty() {
            vec![(String::new(), 0), (String::new(), 1)]
        } else {
            spec.interfaces.into_iter().map(|i| (i.id, i.slot)).collect()
        };
        for (local, slot) in slots {
            let iface_id = state.id("i-");
            if !local.is_empty() {
                iface_ids.insert((spec.id.clone(), local), iface_id.clone());
            }
            lab.interfaces.insert(
                iface_id.clone(),
                FakeInterface {
                    id: iface_id,
                    node: id.clone(),
                    slot,
                    kind: "physical",
                },
            );
        }
        lab.nodes.insert(
            id.clone(),
            FakeNode {
                id,
                label: spec.label,
                node_definition: spec.node_definition,
                image_definition: None,
                configuration: spec.configuration,
                tags: spec.tags,
                x: 0,
                y: 0,
                state: State::Defined,
            },
        );
    }

    let mut warnings = Vec::new();
    for link in topology.links {
        let a = iface_ids.get(&(link.n1.clone(), link.i1.clone()));
        let b = iface_ids.get(&(link.n2.clone(), link.i2.clone()));
        let (Some(a), Some(b), Some(na), Some(nb)) = (a, b, node_ids.get(&link.n1), node_ids.get(&link.n2)) else {
            warnings.push(format!("skipped link {}:{} - {}:{}", link.n1, link.i1, link.n2, link.i2));
            continue;
        };
        let id = state.id("l-");
        lab.links.insert(
            id.clone(),
            FakeLink {
                id,
                node_a: na.clone(),
                interface_a: a.clone(),
                node_b: nb.clone(),
                interface_b: b.clone(),
            },
        );
    }

    state.labs.insert(lab_id.clone(), lab);
    (StatusCode::OK, json!({"id": lab_id, "warnings": warnings}))
}

#[async_trait]
impl Transport for FakeController {
    async fn perform(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let (status, body) = self.handle(&request);
        self.journal.lock().push(request);
        if status == StatusCode::NO_CONTENT {
            Ok(ApiResponse::new(status, Vec::new()))
        } else {
            Ok(ApiResponse::json(status, &body))
        }
    }
}
