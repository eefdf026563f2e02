/// Environment variable holding the path of the job's control socket.
pub const JOB_API_SOCKET_ENV: &str = "KILN_JOB_API_SOCKET";

/// Environment variable holding the job's bearer token.
pub const JOB_API_TOKEN_ENV: &str = "KILN_JOB_API_TOKEN";

/// Full path of the environment resource, under the versioned `/api/current-job/v0` prefix.
pub const ENV_PATH: &str = "/api/current-job/v0/env";
