//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Well-known name of the managed pull secret, one per namespace
pub const REGISTRY_SECRET_NAME: &str = "registry-secret";

/// Label identifying objects managed by this controller
pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";

/// Value of [`APP_NAME_LABEL`] on the managed secret
pub const APP_NAME: &str = "registry-secret-manager";

/// Marker label on the managed secret
pub const REGISTRY_SECRET_LABEL: &str = "registry-secret";

/// Value of [`REGISTRY_SECRET_LABEL`] on the managed secret
pub const REGISTRY_SECRET_LABEL_VALUE: &str = "true";

/// Annotation stamped with the time the credentials were last refreshed
pub const LAST_REFRESH_ANNOTATION: &str = "registry-secret-manager/last-refresh";

/// Secret type for registry auth files
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Data key holding the registry auth file
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Email written into every auth entry.
///
/// Kubernetes rejects dockerconfigjson entries without an email
/// (kubernetes/kubernetes#41727) even though registries ignore it, so any
/// syntactically valid address works.
pub const DOCKER_CONFIG_EMAIL: &str = "registry-secret-manager@example.com";

/// Default refresh cadence for the managed secret (seconds).
///
/// Three hours, well inside the 12 hour lifetime of an ECR token.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3 * 60 * 60;

/// Default requeue interval for reconciliation errors (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Default bound for a single provider login or cluster API call (seconds)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Default deadline for securing the registry secret while answering an
/// admission review (seconds). Stays under the API server's 10 second default
/// webhook timeout.
pub const DEFAULT_ADMISSION_TIMEOUT_SECS: u64 = 5;

/// The API server gives up on a webhook after at most 30 seconds
pub const MAX_ADMISSION_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of reconciliations running at once
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: usize = 10;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_PROBE_PORT: u16 = 8080;

/// Default HTTPS port for the admission webhook
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default delay before restarting a watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Certificate file name inside the webhook cert dir
pub const TLS_CERT_FILE: &str = "tls.crt";

/// Private key file name inside the webhook cert dir
pub const TLS_KEY_FILE: &str = "tls.key";

/// Name of the optional config file (searched in `.`, the executable dir and `$HOME`)
pub const CONFIG_FILE_NAME: &str = "config.yml";
