//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;
use libs3csi::DriverConfig;

/// S3 CSI driver: serves bucket-backed volumes over QUIC.
#[derive(Parser, Debug)]
#[command(name = "s3csi", version)]
pub struct Args {
    /// YAML configuration file.
    #[arg(short, long, env = "S3CSI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen endpoint, `quic://host:port`.
    #[arg(long, env = "CSI_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Identifier reported by NodeGetInfo.
    #[arg(long, env = "NODE_ID")]
    pub node_id: Option<String>,

    /// Path of the S3 FUSE bridge binary.
    #[arg(long)]
    pub mount_binary_s3: Option<PathBuf>,

    /// Path of the system mount binary.
    #[arg(long)]
    pub mount_binary: Option<PathBuf>,

    /// PEM certificate chain served to QUIC clients.
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key of the certificate.
    #[arg(long)]
    pub tls_key: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "S3CSI_LOG_LEVEL")]
    pub log_level: String,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,

    /// Keep buckets in memory instead of talking to the object store.
    #[arg(long)]
    pub dev: bool,
}

impl Args {
    /// Apply flags that were given on top of `config`.
    pub fn apply(&self, config: &mut DriverConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(node_id) = &self.node_id {
            config.node_id = node_id.clone();
        }
        if let Some(path) = &self.mount_binary_s3 {
            config.mount_binary_s3 = path.clone();
        }
        if let Some(path) = &self.mount_binary {
            config.mount_binary = path.clone();
        }
        if let Some(path) = &self.tls_cert {
            config.tls.cert_path = Some(path.clone());
        }
        if let Some(path) = &self.tls_key {
            config.tls.key_path = Some(path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "s3csi",
            "--endpoint",
            "quic://0.0.0.0:7000",
            "--node-id",
            "worker-3",
            "--mount-binary-s3",
            "/opt/bin/mount-s3",
            "--tls-cert",
            "/etc/s3csi/tls.crt",
            "--tls-key",
            "/etc/s3csi/tls.key",
            "--log-json",
        ])
        .unwrap();

        let mut config = DriverConfig::default();
        config.node_id = "from-file".into();
        args.apply(&mut config);

        assert_eq!(config.endpoint, "quic://0.0.0.0:7000");
        assert_eq!(config.node_id, "worker-3");
        assert_eq!(config.mount_binary_s3, PathBuf::from("/opt/bin/mount-s3"));
        assert_eq!(config.mount_binary, PathBuf::from("/bin/mount"));
        assert_eq!(config.tls.cert_path, Some(PathBuf::from("/etc/s3csi/tls.crt")));
        assert!(args.log_json);
        assert!(!args.dev);
    }

    #[test]
    fn absent_flags_keep_config() {
        let args = Args::try_parse_from(["s3csi", "--dev"]).unwrap();
        let mut config = DriverConfig::default();
        config.node_id = "from-file".into();
        args.apply(&mut config);

        assert_eq!(config.node_id, "from-file");
        assert!(args.dev);
    }
}
