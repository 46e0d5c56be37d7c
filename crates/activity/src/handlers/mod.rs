pub mod file;
pub mod http;
pub mod log;
pub mod mail;
pub mod rabbitmq;
pub mod script;
pub mod sql;
pub mod transfer;
pub mod transform;

use std::sync::Arc;

use crate::ActivityRegistry;

/// Registers every built-in handler (spec §4.2) into `registry`.
pub fn register_builtins(registry: &ActivityRegistry) {
    registry.register(Arc::new(http::HttpHandler::default()));
    registry.register(Arc::new(sql::SqlHandler));
    registry.register(Arc::new(transfer::SftpHandler));
    registry.register(Arc::new(transfer::S3Handler));
    registry.register(Arc::new(transfer::SmbHandler));
    registry.register(Arc::new(mail::MailHandler));
    registry.register(Arc::new(rabbitmq::RabbitMqProducerHandler));
    registry.register(Arc::new(transform::TransformHandler));
    registry.register(Arc::new(file::FileHandler));
    registry.register(Arc::new(log::LogHandler));
    registry.register(Arc::new(script::ScriptHandler));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_activity_type_is_registered() {
        let registry = ActivityRegistry::with_builtins();
        for activity_type in [
            "http",
            "sql",
            "sftp",
            "s3",
            "smb",
            "mail",
            "rabbitmq-producer",
            "transform",
            "file",
            "log",
            "script",
        ] {
            assert!(
                registry.lookup(activity_type).is_some(),
                "missing handler for `{activity_type}`"
            );
        }
    }
}
