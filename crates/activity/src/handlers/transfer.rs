//! `sftp`, `s3`, `smb` activities: list/download/upload against a
//! remote file store. Each backend implements [`RemoteFolder`]; the
//! handler wraps it with the shared `get`/`put` contract (spec §4.2).

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use flowmesh_context::ExecutionContext;
use flowmesh_error::FlowError;
use regex::Regex;
use serde_json::{json, Value};
use tokio::fs;

use crate::{ActivityHandler, ActivityInput};

fn required_str<'a>(config: &'a Value, key: &str) -> Result<&'a str, FlowError> {
    config
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| FlowError::config(format!("node requires `{key}`")))
}

fn method(config: &Value) -> Result<&str, FlowError> {
    match required_str(config, "method")? {
        m @ ("get" | "put") => Ok(m),
        other => Err(FlowError::config(format!(
            "method must be `get` or `put`, got `{other}`"
        ))),
    }
}

async fn list_local_files(local_folder: &str) -> Result<Vec<String>, FlowError> {
    let mut names = Vec::new();
    let mut entries = fs::read_dir(local_folder)
        .await
        .map_err(|e| FlowError::activity(format!("cannot read `{local_folder}`: {e}")))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FlowError::activity(format!("readdir failed: {e}")))?
    {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_owned());
        }
    }
    Ok(names)
}

fn compile_filter(config: &Value) -> Result<Option<Regex>, FlowError> {
    config
        .get("regex_filter")
        .and_then(Value::as_str)
        .map(|pattern| Regex::new(pattern).map_err(|e| FlowError::config(format!("invalid regex_filter: {e}"))))
        .transpose()
}

/// A remote folder a `get`/`put` can target. Implemented per backend
/// (SFTP over SSH, S3 bucket, SMB share).
#[async_trait]
trait RemoteFolder: Send + Sync {
    async fn list(&self, folder: &str) -> Result<Vec<String>, FlowError>;
    async fn download(&self, folder: &str, name: &str, local_path: &Path) -> Result<(), FlowError>;
    async fn upload(&self, folder: &str, name: &str, local_path: &Path) -> Result<(), FlowError>;
    async fn exists(&self, folder: &str, name: &str) -> Result<bool, FlowError>;
    async fn create_folder(&self, folder: &str) -> Result<(), FlowError>;
}

async fn run_get(backend: &dyn RemoteFolder, config: &Value) -> Result<Value, FlowError> {
    let folder = required_str(config, "folder")?;
    let local_folder = required_str(config, "local_folder")?;
    let filter = compile_filter(config)?;

    let names = backend.list(folder).await?;
    let matching: Vec<String> = names
        .into_iter()
        .filter(|n| filter.as_ref().is_none_or(|re| re.is_match(n)))
        .collect();

    fs::create_dir_all(local_folder)
        .await
        .map_err(|e| FlowError::activity(format!("cannot create `{local_folder}`: {e}")))?;

    for name in &matching {
        let local_path = Path::new(local_folder).join(name);
        backend.download(folder, name, &local_path).await?;
    }

    Ok(json!({
        "files_downloaded": matching,
        "count": matching.len(),
    }))
}

async fn run_put(backend: &dyn RemoteFolder, config: &Value) -> Result<Value, FlowError> {
    let folder = required_str(config, "folder")?;
    let local_folder = required_str(config, "local_folder")?;
    let overwrite = config.get("overwrite").and_then(Value::as_bool).unwrap_or(true);
    let create_folder = config.get("create_folder").and_then(Value::as_bool).unwrap_or(false);

    let files: Vec<String> = config
        .get("files")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
        .unwrap_or_else(|| Vec::new());

    if create_folder {
        backend.create_folder(folder).await?;
    }

    let mut uploaded = Vec::new();
    for name in &files {
        if !overwrite && backend.exists(folder, name).await? {
            continue;
        }
        let local_path = Path::new(local_folder).join(name);
        backend.upload(folder, name, &local_path).await?;
        uploaded.push(name.clone());
    }

    Ok(json!({
        "files_uploaded": uploaded,
        "count": uploaded.len(),
    }))
}

// ─── SFTP ────────────────────────────────────────────────────────────

struct SftpBackend<'a> {
    config: &'a Value,
}

impl SftpBackend<'_> {
    fn session(&self) -> Result<ssh2::Session, FlowError> {
        let server = required_str(self.config, "server")?;
        let user = self.config.get("user").and_then(Value::as_str).unwrap_or("");
        let password = self.config.get("password").and_then(Value::as_str);

        let tcp = std::net::TcpStream::connect(server)
            .map_err(|e| FlowError::activity(format!("sftp connect failed: {e}")))?;
        let mut session = ssh2::Session::new().map_err(|e| FlowError::activity(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| FlowError::activity(e.to_string()))?;
        if let Some(password) = password {
            session
                .userauth_password(user, password)
                .map_err(|e| FlowError::activity(format!("sftp auth failed: {e}")))?;
        }
        Ok(session)
    }
}

#[async_trait]
impl RemoteFolder for SftpBackend<'_> {
    async fn list(&self, folder: &str) -> Result<Vec<String>, FlowError> {
        let session = self.session()?;
        let sftp = session.sftp().map_err(|e| FlowError::activity(e.to_string()))?;
        let entries = sftp
            .readdir(Path::new(folder))
            .map_err(|e| FlowError::activity(format!("sftp readdir failed: {e}")))?;
        Ok(entries
            .into_iter()
            .filter_map(|(path, _stat)| path.file_name().and_then(|n| n.to_str()).map(str::to_owned))
            .collect())
    }

    async fn download(&self, folder: &str, name: &str, local_path: &Path) -> Result<(), FlowError> {
        use std::io::{Read, Write};
        let session = self.session()?;
        let sftp = session.sftp().map_err(|e| FlowError::activity(e.to_string()))?;
        let mut remote = sftp
            .open(&Path::new(folder).join(name))
            .map_err(|e| FlowError::activity(format!("sftp open failed: {e}")))?;
        let mut buf = Vec::new();
        remote
            .read_to_end(&mut buf)
            .map_err(|e| FlowError::activity(format!("sftp read failed: {e}")))?;
        let mut file =
            std::fs::File::create(local_path).map_err(|e| FlowError::activity(format!("local write failed: {e}")))?;
        file.write_all(&buf)
            .map_err(|e| FlowError::activity(format!("local write failed: {e}")))?;
        Ok(())
    }

    async fn upload(&self, folder: &str, name: &str, local_path: &Path) -> Result<(), FlowError> {
        use std::io::{Read, Write};
        let session = self.session()?;
        let sftp = session.sftp().map_err(|e| FlowError::activity(e.to_string()))?;
        let mut buf = Vec::new();
        std::fs::File::open(local_path)
            .map_err(|e| FlowError::activity(format!("local read failed: {e}")))?
            .read_to_end(&mut buf)
            .map_err(|e| FlowError::activity(format!("local read failed: {e}")))?;
        let mut remote = sftp
            .create(&Path::new(folder).join(name))
            .map_err(|e| FlowError::activity(format!("sftp create failed: {e}")))?;
        remote
            .write_all(&buf)
            .map_err(|e| FlowError::activity(format!("sftp write failed: {e}")))?;
        Ok(())
    }

    async fn exists(&self, folder: &str, name: &str) -> Result<bool, FlowError> {
        let session = self.session()?;
        let sftp = session.sftp().map_err(|e| FlowError::activity(e.to_string()))?;
        Ok(sftp.stat(&Path::new(folder).join(name)).is_ok())
    }

    async fn create_folder(&self, folder: &str) -> Result<(), FlowError> {
        let session = self.session()?;
        let sftp = session.sftp().map_err(|e| FlowError::activity(e.to_string()))?;
        match sftp.mkdir(Path::new(folder), 0o755) {
            Ok(()) => Ok(()),
            Err(e) if self.exists_dir(&sftp, folder) => {
                tracing::debug!(error = %e, "sftp folder already exists");
                Ok(())
            }
            Err(e) => Err(FlowError::activity(format!("sftp mkdir failed: {e}"))),
        }
    }
}

impl SftpBackend<'_> {
    fn exists_dir(&self, sftp: &ssh2::Sftp, folder: &str) -> bool {
        sftp.stat(Path::new(folder)).is_ok()
    }
}

#[derive(Default)]
pub struct SftpHandler;

#[async_trait]
impl ActivityHandler for SftpHandler {
    fn activity_type(&self) -> &'static str {
        "sftp"
    }

    async fn execute(
        &self,
        _input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        required_str(config, "server")?;
        required_str(config, "folder")?;
        let backend = SftpBackend { config };
        match method(config)? {
            "get" => run_get(&backend, config).await,
            _ => run_put(&backend, config).await,
        }
    }
}

// ─── S3 ──────────────────────────────────────────────────────────────

struct S3Backend<'a> {
    config: &'a Value,
}

impl S3Backend<'_> {
    async fn client(&self) -> Result<aws_sdk_s3::Client, FlowError> {
        let region = self.config.get("region").and_then(Value::as_str).unwrap_or("us-east-1");
        let sdk_config = aws_config::from_env()
            .region(aws_sdk_s3::config::Region::new(region.to_owned()))
            .load()
            .await;
        Ok(aws_sdk_s3::Client::new(&sdk_config))
    }

    fn bucket(&self) -> Result<&str, FlowError> {
        required_str(self.config, "bucket")
    }
}

#[async_trait]
impl RemoteFolder for S3Backend<'_> {
    async fn list(&self, folder: &str) -> Result<Vec<String>, FlowError> {
        let client = self.client().await?;
        let bucket = self.bucket()?;
        let response = client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(folder)
            .send()
            .await
            .map_err(|e| FlowError::activity(format!("s3 list failed: {e}")))?;
        Ok(response
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .map(str::to_owned)
            .collect())
    }

    async fn download(&self, _folder: &str, name: &str, local_path: &Path) -> Result<(), FlowError> {
        let client = self.client().await?;
        let bucket = self.bucket()?;
        let object = client
            .get_object()
            .bucket(bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| FlowError::activity(format!("s3 get_object failed: {e}")))?;
        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| FlowError::activity(format!("s3 download failed: {e}")))?
            .into_bytes();
        fs::write(local_path, bytes)
            .await
            .map_err(|e| FlowError::activity(format!("local write failed: {e}")))?;
        Ok(())
    }

    async fn upload(&self, folder: &str, name: &str, local_path: &Path) -> Result<(), FlowError> {
        let client = self.client().await?;
        let bucket = self.bucket()?;
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| FlowError::activity(format!("local read failed: {e}")))?;
        client
            .put_object()
            .bucket(bucket)
            .key(format!("{folder}/{name}"))
            .body(body)
            .send()
            .await
            .map_err(|e| FlowError::activity(format!("s3 put_object failed: {e}")))?;
        Ok(())
    }

    async fn exists(&self, _folder: &str, name: &str) -> Result<bool, FlowError> {
        let client = self.client().await?;
        let bucket = self.bucket()?;
        Ok(client.head_object().bucket(bucket).key(name).send().await.is_ok())
    }

    async fn create_folder(&self, _folder: &str) -> Result<(), FlowError> {
        // S3 has no real directories; prefixes are created implicitly by put_object.
        Ok(())
    }
}

#[derive(Default)]
pub struct S3Handler;

#[async_trait]
impl ActivityHandler for S3Handler {
    fn activity_type(&self) -> &'static str {
        "s3"
    }

    async fn execute(
        &self,
        _input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        required_str(config, "server")?;
        required_str(config, "folder")?;
        required_str(config, "bucket")?;
        let backend = S3Backend { config };
        match method(config)? {
            "get" => run_get(&backend, config).await,
            _ => run_put(&backend, config).await,
        }
    }
}

// ─── SMB ─────────────────────────────────────────────────────────────

struct SmbBackend<'a> {
    config: &'a Value,
}

impl SmbBackend<'_> {
    fn client(&self) -> Result<pavao::SmbClient, FlowError> {
        let server = required_str(self.config, "server")?;
        let share = required_str(self.config, "share")?;
        let user = self.config.get("user").and_then(Value::as_str).unwrap_or("guest");
        let password = self.config.get("password").and_then(Value::as_str).unwrap_or("");
        let uri = format!("smb://{server}/{share}");
        let credentials = pavao::SmbCredentials::default()
            .server(format!("smb://{server}"))
            .share(share)
            .username(user)
            .password(password);
        pavao::SmbClient::new(credentials, pavao::SmbOptions::default())
            .map_err(|e| FlowError::activity(format!("smb connect failed ({uri}): {e}")))
    }
}

#[async_trait]
impl RemoteFolder for SmbBackend<'_> {
    async fn list(&self, folder: &str) -> Result<Vec<String>, FlowError> {
        let client = self.client()?;
        let entries = client
            .list_dir(folder)
            .map_err(|e| FlowError::activity(format!("smb list_dir failed: {e}")))?;
        Ok(entries.into_iter().map(|e| e.name().to_owned()).collect())
    }

    async fn download(&self, folder: &str, name: &str, local_path: &Path) -> Result<(), FlowError> {
        use std::io::{Read, Write};
        let client = self.client()?;
        let remote_path = format!("{folder}/{name}");
        let mut remote = client
            .open_with(&remote_path, pavao::SmbOpenOptions::default().read(true))
            .map_err(|e| FlowError::activity(format!("smb open failed: {e}")))?;
        let mut buf = Vec::new();
        remote
            .read_to_end(&mut buf)
            .map_err(|e| FlowError::activity(format!("smb read failed: {e}")))?;
        std::fs::File::create(local_path)
            .map_err(|e| FlowError::activity(format!("local write failed: {e}")))?
            .write_all(&buf)
            .map_err(|e| FlowError::activity(format!("local write failed: {e}")))?;
        Ok(())
    }

    async fn upload(&self, folder: &str, name: &str, local_path: &Path) -> Result<(), FlowError> {
        use std::io::{Read, Write};
        let client = self.client()?;
        let mut buf = Vec::new();
        std::fs::File::open(local_path)
            .map_err(|e| FlowError::activity(format!("local read failed: {e}")))?
            .read_to_end(&mut buf)
            .map_err(|e| FlowError::activity(format!("local read failed: {e}")))?;
        let remote_path = format!("{folder}/{name}");
        let mut remote = client
            .open_with(&remote_path, pavao::SmbOpenOptions::default().write(true).create(true))
            .map_err(|e| FlowError::activity(format!("smb open failed: {e}")))?;
        remote
            .write_all(&buf)
            .map_err(|e| FlowError::activity(format!("smb write failed: {e}")))?;
        Ok(())
    }

    async fn exists(&self, folder: &str, name: &str) -> Result<bool, FlowError> {
        let client = self.client()?;
        Ok(client.stat(&format!("{folder}/{name}")).is_ok())
    }

    async fn create_folder(&self, folder: &str) -> Result<(), FlowError> {
        let client = self.client()?;
        match client.mkdir(folder) {
            Ok(()) => Ok(()),
            Err(_) if client.stat(folder).is_ok() => Ok(()),
            Err(e) => Err(FlowError::activity(format!("smb mkdir failed: {e}"))),
        }
    }
}

#[derive(Default)]
pub struct SmbHandler;

#[async_trait]
impl ActivityHandler for SmbHandler {
    fn activity_type(&self) -> &'static str {
        "smb"
    }

    async fn execute(
        &self,
        _input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        required_str(config, "server")?;
        required_str(config, "folder")?;
        required_str(config, "share")?;
        let backend = SmbBackend { config };
        match method(config)? {
            "get" => run_get(&backend, config).await,
            _ => run_put(&backend, config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_core::{ExecutionId, ProcessId};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(ExecutionId::new(), ProcessId::new("p"), json!({}))
    }

    #[tokio::test]
    async fn sftp_missing_server_is_a_config_error() {
        let handler = SftpHandler;
        let config = json!({"folder": "/in", "method": "get", "local_folder": "/tmp"});
        assert!(handler.execute(&ActivityInput::new(), &config, &ctx()).await.is_err());
    }

    #[tokio::test]
    async fn s3_invalid_method_is_a_config_error() {
        let handler = S3Handler;
        let config = json!({"server": "s3.amazonaws.com", "folder": "in", "bucket": "b", "method": "delete"});
        assert!(handler.execute(&ActivityInput::new(), &config, &ctx()).await.is_err());
    }

    #[test]
    fn bad_regex_filter_fails_before_any_io() {
        let config = json!({"regex_filter": "(unterminated"});
        assert!(compile_filter(&config).is_err());
    }
}
