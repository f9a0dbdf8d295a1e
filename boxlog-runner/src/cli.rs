//! Command-line surface

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "boxlog")]
#[command(
    version,
    about = "Run a command in a container and ship its output to CloudWatch Logs",
    long_about = None
)]
pub struct Cli {
    /// Name of the image to run (e.g. python:3.12-alpine)
    #[arg(long, env = "BOXLOG_DOCKER_IMAGE")]
    pub docker_image: String,

    /// Shell command to execute inside the container
    #[arg(long, env = "BOXLOG_BASH_COMMAND")]
    pub bash_command: String,

    /// CloudWatch log group (created if missing)
    #[arg(long, env = "BOXLOG_CLOUDWATCH_GROUP")]
    pub cloudwatch_group: String,

    /// CloudWatch log stream (created if missing)
    #[arg(long, env = "BOXLOG_CLOUDWATCH_STREAM")]
    pub cloudwatch_stream: String,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key_id: String,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: String,

    #[arg(long, env = "AWS_REGION")]
    pub aws_region: String,

    /// Seconds between uploads (0 selects the uploader default)
    #[arg(long, env = "BOXLOG_FLUSH_INTERVAL", default_value_t = 3)]
    pub flush_interval: u64,

    /// Output lines held between the container and the uploader
    #[arg(long, env = "BOXLOG_BUFFER_LINES", default_value_t = 100)]
    pub buffer_lines: usize,

    /// Docker-compatible CLI used to manage the container
    #[arg(long, env = "BOXLOG_CONTAINER_RUNTIME", default_value = "docker")]
    pub container_runtime: String,

    /// Seconds the container gets to stop before it is killed
    #[arg(long, env = "BOXLOG_STOP_TIMEOUT", default_value_t = 1)]
    pub stop_timeout: u64,

    /// Seconds to wait for the final upload on shutdown
    #[arg(long, env = "BOXLOG_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    pub shutdown_timeout: u64,
}
