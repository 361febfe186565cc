//! Well-known method names, grouped by integration.
//!
//! Each constant is the exact string sent as the `method` field of a
//! [`Request`](crate::Request). Backends may support more than these; the hub
//! only relies on the ones a server declares in its capability list.

/// All well-known method names.
pub struct Methods;

impl Methods {
    // ── Liveness ────────────────────────────────────────────────────────
    pub const HEALTH: &str = "health";

    // ── Jobber ──────────────────────────────────────────────────────────
    pub const JOBBER_CREATE_CLIENT: &str = "create_client";
    pub const JOBBER_CREATE_JOB: &str = "create_job";
    pub const JOBBER_GET_JOBS: &str = "get_jobs";
    pub const JOBBER_SYNC_DATA: &str = "sync_data";

    // ── Slack ───────────────────────────────────────────────────────────
    pub const SLACK_SEND_MESSAGE: &str = "send_message";
    pub const SLACK_GET_CHANNELS: &str = "get_channels";
    pub const SLACK_POST_TO_CHANNEL: &str = "post_to_channel";

    // ── Gmail ───────────────────────────────────────────────────────────
    pub const GMAIL_SEND_EMAIL: &str = "send_email";
    pub const GMAIL_GET_EMAILS: &str = "get_emails";
    pub const GMAIL_CREATE_DRAFT: &str = "create_draft";

    // ── Twilio ──────────────────────────────────────────────────────────
    pub const TWILIO_SEND_SMS: &str = "send_sms";
    pub const TWILIO_MAKE_CALL: &str = "make_call";
    pub const TWILIO_GET_MESSAGES: &str = "get_messages";

    // ── Google Calendar ─────────────────────────────────────────────────
    pub const CALENDAR_CREATE_EVENT: &str = "create_event";
    pub const CALENDAR_GET_EVENTS: &str = "get_events";
    pub const CALENDAR_UPDATE_EVENT: &str = "update_event";

    // ── Matterport ──────────────────────────────────────────────────────
    pub const MATTERPORT_GET_SCANS: &str = "get_scans";
    pub const MATTERPORT_CREATE_SCAN_LINK: &str = "create_scan_link";
    pub const MATTERPORT_ANALYZE_SCAN: &str = "analyze_scan";

    // ── Google Drive ────────────────────────────────────────────────────
    pub const DRIVE_UPLOAD_FILE: &str = "upload_file";
    pub const DRIVE_GET_FILES: &str = "get_files";
    pub const DRIVE_SHARE_FILE: &str = "share_file";

    // ── Hub collaborators (served by the bridge process) ────────────────
    pub const HUB_CONTEXT: &str = "hub/context";
    pub const HUB_DECIDE: &str = "hub/decide";
    pub const HUB_ANALYZE: &str = "hub/analyze";
    pub const HUB_DRAFT_REPLY: &str = "hub/draftReply";
}

/// Default capability list for a well-known integration id.
/// Unknown ids get an empty list.
pub fn default_capabilities(server_id: &str) -> &'static [MethodName] {
    match server_id {
        "slack" => &[
            Methods::SLACK_SEND_MESSAGE,
            Methods::SLACK_GET_CHANNELS,
            Methods::SLACK_POST_TO_CHANNEL,
        ],
        "jobber" => &[
            Methods::JOBBER_CREATE_CLIENT,
            Methods::JOBBER_CREATE_JOB,
            Methods::JOBBER_GET_JOBS,
            Methods::JOBBER_SYNC_DATA,
        ],
        "gmail" => &[
            Methods::GMAIL_SEND_EMAIL,
            Methods::GMAIL_GET_EMAILS,
            Methods::GMAIL_CREATE_DRAFT,
        ],
        "twilio" => &[
            Methods::TWILIO_SEND_SMS,
            Methods::TWILIO_MAKE_CALL,
            Methods::TWILIO_GET_MESSAGES,
        ],
        "google-calendar" => &[
            Methods::CALENDAR_CREATE_EVENT,
            Methods::CALENDAR_GET_EVENTS,
            Methods::CALENDAR_UPDATE_EVENT,
        ],
        "matterport" => &[
            Methods::MATTERPORT_GET_SCANS,
            Methods::MATTERPORT_ANALYZE_SCAN,
            Methods::MATTERPORT_CREATE_SCAN_LINK,
        ],
        "google-drive" => &[
            Methods::DRIVE_UPLOAD_FILE,
            Methods::DRIVE_GET_FILES,
            Methods::DRIVE_SHARE_FILE,
        ],
        _ => &[],
    }
}

/// The method name is always a `&str` at the protocol level.
pub type MethodName = &'static str;
