//! JSON-RPC method and notification names

pub const CREATE_INCIDENT: &str = "incidents/create";
pub const GET_INCIDENT: &str = "incidents/get";
pub const LIST_INCIDENTS: &str = "incidents/list";
pub const UPDATE_INCIDENT: &str = "incidents/update";
pub const DELETE_INCIDENT: &str = "incidents/delete";
pub const CONFIRM_INCIDENT: &str = "incidents/confirm";
pub const CHANGE_STATUS: &str = "incidents/change_status";
pub const INCIDENT_ALERTS: &str = "incidents/alerts";
pub const ADD_ALERTS: &str = "incidents/add_alerts";
pub const REMOVE_ALERTS: &str = "incidents/remove_alerts";
pub const INCIDENTS_META: &str = "incidents/meta";
pub const COMMIT_CANDIDATES: &str = "incidents/commit_candidates";
pub const SUBSCRIBE: &str = "incidents/subscribe";
pub const INGEST_ALERTS: &str = "alerts/ingest";
pub const HEALTH: &str = "incidentd/health";

/// Server-to-client notifications
pub const INCIDENT_CHANGE_NOTIFICATION: &str = "incidents/change";
pub const INCIDENT_WORKFLOW_NOTIFICATION: &str = "incidents/workflow";

/// All supported JSON-RPC methods
pub const ALL_METHODS: &[&str] = &[
    CREATE_INCIDENT,
    GET_INCIDENT,
    LIST_INCIDENTS,
    UPDATE_INCIDENT,
    DELETE_INCIDENT,
    CONFIRM_INCIDENT,
    CHANGE_STATUS,
    INCIDENT_ALERTS,
    ADD_ALERTS,
    REMOVE_ALERTS,
    INCIDENTS_META,
    COMMIT_CANDIDATES,
    SUBSCRIBE,
    INGEST_ALERTS,
    HEALTH,
];
