use reqwest::blocking::{Body, Client, Response};
use std::fs::File;
use std::io::{self, Write};
use std::time::Duration;

use crate::error::{DropfsError, RemoteError, RemoteResult, Result};
use crate::metadata::Metadata;
use crate::remote::credentials::Credentials;
use crate::remote::endpoint::{self, Args, Endpoint, Hosts, Method, Opt};
use crate::remote::wire::{self, AccountInfo, WireMetadata};
use crate::remote::{MetadataOptions, OverwritePolicy, RemoteRoot, RemoteStorage};

/// Response header carrying the metadata of a downloaded object.
const METADATA_HEADER: &str = "x-dropbox-metadata";

/// Blocking HTTP client for the remote storage API.
///
/// Every call is synchronous; the calling thread waits for the response.
pub struct HttpRemote {
    client: Client,
    hosts: Hosts,
    credentials: Credentials,
}

impl HttpRemote {
    /// Build a client. `timeout` of `None` keeps the transport default.
    pub fn new(hosts: Hosts, credentials: Credentials, timeout: Option<Duration>) -> Result<Self> {
        let mut builder =
            Client::builder().user_agent(concat!("dropfs/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| DropfsError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpRemote {
            client,
            hosts,
            credentials,
        })
    }

    fn invoke(&self, endpoint: &Endpoint, args: &Args, body: Option<Body>) -> RemoteResult<Response> {
        let url = endpoint.url(&self.hosts, args)?;
        tracing::debug!("{} {}", endpoint.name, url);

        let request = match endpoint.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
        };
        let request = request.bearer_auth(self.credentials.token());
        let request = match body {
            Some(body) => request
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body),
            None => request,
        };

        let response = request
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} answered {}", endpoint.name, status);
            return Err(RemoteError::Status(status.as_u16()));
        }
        Ok(response)
    }

    fn invoke_metadata(
        &self,
        endpoint: &Endpoint,
        args: &Args,
        body: Option<Body>,
    ) -> RemoteResult<Metadata> {
        let response = self.invoke(endpoint, args, body)?;
        let wire: WireMetadata = response
            .json()
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;
        Ok(wire.into_metadata())
    }

    pub fn account_info(&self) -> RemoteResult<AccountInfo> {
        self.invoke(&endpoint::ACCOUNT_INFO, &Args::new(), None)?
            .json()
            .map_err(|e| RemoteError::Malformed(e.to_string()))
    }
}

pub(crate) fn metadata_args(root: RemoteRoot, path: &str, options: &MetadataOptions) -> Args {
    let mut args = Args::new()
        .with(Opt::Root, root.as_str())
        .with(Opt::Path, path);
    if options.list {
        args = args.with_flag(Opt::List, true);
    }
    if options.include_deleted {
        args = args.with_flag(Opt::IncludeDeleted, true);
    }
    if let Some(limit) = options.file_limit {
        args = args.with(Opt::FileLimit, limit.to_string());
    }
    if let Some(hash) = &options.hash {
        args = args.with(Opt::Hash, hash.clone());
    }
    if let Some(rev) = &options.rev {
        args = args.with(Opt::Rev, rev.clone());
    }
    args
}

fn path_args(root: RemoteRoot, path: &str) -> Args {
    Args::new()
        .with(Opt::Root, root.as_str())
        .with(Opt::Path, path)
}

impl RemoteStorage for HttpRemote {
    fn fetch_metadata(
        &self,
        root: RemoteRoot,
        path: &str,
        options: &MetadataOptions,
    ) -> RemoteResult<Metadata> {
        self.invoke_metadata(&endpoint::METADATA, &metadata_args(root, path, options), None)
    }

    fn create_folder(&self, root: RemoteRoot, path: &str) -> RemoteResult<Metadata> {
        self.invoke_metadata(&endpoint::CREATE_FOLDER, &path_args(root, path), None)
    }

    fn delete(&self, root: RemoteRoot, path: &str) -> RemoteResult<Metadata> {
        self.invoke_metadata(&endpoint::DELETE, &path_args(root, path), None)
    }

    fn move_entry(&self, root: RemoteRoot, from: &str, to: &str) -> RemoteResult<Metadata> {
        let args = Args::new()
            .with(Opt::Root, root.as_str())
            .with(Opt::FromPath, from)
            .with(Opt::ToPath, to);
        self.invoke_metadata(&endpoint::MOVE, &args, None)
    }

    fn upload_file(
        &self,
        root: RemoteRoot,
        path: &str,
        content: File,
        overwrite: OverwritePolicy,
    ) -> RemoteResult<Metadata> {
        let len = content
            .metadata()
            .map_err(|e| RemoteError::InvalidArgument(format!("unreadable upload body: {}", e)))?
            .len();
        // streamed from disk with a known Content-Length
        let body = Body::sized(content, len);

        let args = path_args(root, path)
            .with_flag(Opt::Overwrite, overwrite == OverwritePolicy::Overwrite);
        self.invoke_metadata(&endpoint::PUT_FILE, &args, Some(body))
    }

    fn download_file(
        &self,
        root: RemoteRoot,
        path: &str,
        sink: &mut dyn Write,
    ) -> RemoteResult<Metadata> {
        let mut response = self.invoke(&endpoint::GET_FILE, &path_args(root, path), None)?;

        let metadata = response
            .headers()
            .get(METADATA_HEADER)
            .ok_or_else(|| RemoteError::Malformed(format!("missing {} header", METADATA_HEADER)))?
            .to_str()
            .map_err(|e| RemoteError::Malformed(e.to_string()))
            .and_then(wire::parse_metadata)?;

        io::copy(&mut response, sink).map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(metadata)
    }
}
