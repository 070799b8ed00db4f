//! Metric name and label definitions.
//!
//! Centralizing these keeps metric names consistent between the crates that
//! record them.

/// Inbound message pipeline metrics
pub mod inbound {
    /// Total inbound messages handed to the panel pipeline
    pub const MESSAGES_RECEIVED_TOTAL: &str = "wapanel_inbound_messages_received_total";
    /// Conversations revived from the hidden set by a new message
    pub const CHATS_UNHIDDEN_TOTAL: &str = "wapanel_inbound_chats_unhidden_total";
}

/// Auto-reply engine metrics
pub mod auto_reply {
    /// Eligibility decisions, labelled by outcome
    pub const DECISIONS_TOTAL: &str = "wapanel_auto_reply_decisions_total";
    /// Automated replies delivered, labelled by source (rule / welcome)
    pub const REPLIES_SENT_TOTAL: &str = "wapanel_auto_reply_replies_sent_total";
    /// Automated replies that failed to deliver
    pub const DELIVERY_FAILURES_TOTAL: &str = "wapanel_auto_reply_delivery_failures_total";
    /// Rules skipped because their pattern could not be evaluated
    pub const RULE_ERRORS_TOTAL: &str = "wapanel_auto_reply_rule_errors_total";
    /// Actions that failed, labelled by action kind
    pub const ACTION_FAILURES_TOTAL: &str = "wapanel_auto_reply_action_failures_total";
    /// Time spent executing a reply plus its action chain
    pub const CHAIN_DURATION_SECONDS: &str = "wapanel_auto_reply_chain_duration_seconds";
}

/// Outbound dispatcher metrics
pub mod dispatch {
    /// Transport send attempts (including retries)
    pub const ATTEMPTS_TOTAL: &str = "wapanel_dispatch_attempts_total";
    /// Retries caused by transient transport errors
    pub const RETRIES_TOTAL: &str = "wapanel_dispatch_retries_total";
    /// Sends that ultimately failed, labelled by error type
    pub const FAILURES_TOTAL: &str = "wapanel_dispatch_failures_total";
    /// Time a send waited for the queue
    pub const QUEUE_WAIT_SECONDS: &str = "wapanel_dispatch_queue_wait_seconds";
}

/// Common label keys
pub mod labels {
    pub const OUTCOME: &str = "outcome";
    pub const SOURCE: &str = "source";
    pub const ACTION: &str = "action";
    pub const OPERATION: &str = "operation";
    pub const ERROR_TYPE: &str = "error_type";
}
