//! Table of remote endpoints and the argument policy each one enforces.
//!
//! Every call goes through [`Endpoint::url`], which rejects options the
//! endpoint does not accept, options given twice and missing required
//! options before anything is sent.

use url::Url;

use crate::error::{RemoteError, RemoteResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opt {
    Root,
    Path,
    FromPath,
    ToPath,
    List,
    IncludeDeleted,
    FileLimit,
    Hash,
    Rev,
    Overwrite,
    ParentRev,
    Locale,
}

impl Opt {
    pub fn name(self) -> &'static str {
        match self {
            Opt::Root => "root",
            Opt::Path => "path",
            Opt::FromPath => "from_path",
            Opt::ToPath => "to_path",
            Opt::List => "list",
            Opt::IncludeDeleted => "include_deleted",
            Opt::FileLimit => "file_limit",
            Opt::Hash => "hash",
            Opt::Rev => "rev",
            Opt::Overwrite => "overwrite",
            Opt::ParentRev => "parent_rev",
            Opt::Locale => "locale",
        }
    }

    fn is_path(self) -> bool {
        matches!(self, Opt::Path | Opt::FromPath | Opt::ToPath)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    Api,
    Content,
}

/// Base URLs for the two hosts the service is split across.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hosts {
    pub api: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub name: &'static str,
    pub method: Method,
    pub host: Host,
    pub path: &'static str,
    /// `root` and `path` are appended to the URL path instead of the query.
    pub path_style: bool,
    pub required: &'static [Opt],
    pub optional: &'static [Opt],
}

pub const ACCOUNT_INFO: Endpoint = Endpoint {
    name: "account_info",
    method: Method::Get,
    host: Host::Api,
    path: "/1/account/info",
    path_style: false,
    required: &[],
    optional: &[Opt::Locale],
};

pub const METADATA: Endpoint = Endpoint {
    name: "metadata",
    method: Method::Get,
    host: Host::Api,
    path: "/1/metadata",
    path_style: true,
    required: &[Opt::Root, Opt::Path],
    optional: &[
        Opt::FileLimit,
        Opt::Hash,
        Opt::List,
        Opt::IncludeDeleted,
        Opt::Rev,
        Opt::Locale,
    ],
};

pub const GET_FILE: Endpoint = Endpoint {
    name: "files",
    method: Method::Get,
    host: Host::Content,
    path: "/1/files",
    path_style: true,
    required: &[Opt::Root, Opt::Path],
    optional: &[Opt::Rev],
};

pub const PUT_FILE: Endpoint = Endpoint {
    name: "files_put",
    method: Method::Put,
    host: Host::Content,
    path: "/1/files_put",
    path_style: true,
    required: &[Opt::Root, Opt::Path],
    optional: &[Opt::Overwrite, Opt::ParentRev, Opt::Locale],
};

pub const CREATE_FOLDER: Endpoint = Endpoint {
    name: "create_folder",
    method: Method::Post,
    host: Host::Api,
    path: "/1/fileops/create_folder",
    path_style: false,
    required: &[Opt::Root, Opt::Path],
    optional: &[Opt::Locale],
};

pub const DELETE: Endpoint = Endpoint {
    name: "delete",
    method: Method::Post,
    host: Host::Api,
    path: "/1/fileops/delete",
    path_style: false,
    required: &[Opt::Root, Opt::Path],
    optional: &[Opt::Locale],
};

pub const MOVE: Endpoint = Endpoint {
    name: "move",
    method: Method::Post,
    host: Host::Api,
    path: "/1/fileops/move",
    path_style: false,
    required: &[Opt::Root, Opt::FromPath, Opt::ToPath],
    optional: &[Opt::Locale],
};

/// Option/value pairs for one call, in the order they were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    pairs: Vec<(Opt, String)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, opt: Opt, value: impl Into<String>) -> Self {
        self.pairs.push((opt, value.into()));
        self
    }

    pub fn with_flag(self, opt: Opt, value: bool) -> Self {
        self.with(opt, if value { "true" } else { "false" })
    }

    pub fn get(&self, opt: Opt) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(o, _)| *o == opt)
            .map(|(_, v)| v.as_str())
    }
}

impl Endpoint {
    fn accepts(&self, opt: Opt) -> bool {
        self.required.contains(&opt) || self.optional.contains(&opt)
    }

    pub fn validate(&self, args: &Args) -> RemoteResult<()> {
        for (i, (opt, value)) in args.pairs.iter().enumerate() {
            if args.pairs[..i].iter().any(|(seen, _)| seen == opt) {
                return Err(RemoteError::DuplicatedOption(opt.name()));
            }
            if !self.accepts(*opt) {
                return Err(RemoteError::IllegalOption(opt.name(), self.name));
            }
            if opt.is_path() && !value.starts_with('/') {
                return Err(RemoteError::InvalidArgument(format!(
                    "{} must be absolute, got '{}'",
                    opt.name(),
                    value
                )));
            }
        }

        for opt in self.required {
            if args.get(*opt).is_none() {
                return Err(RemoteError::MissingOption(opt.name()));
            }
        }

        Ok(())
    }

    /// Validate `args` and build the request URL.
    pub fn url(&self, hosts: &Hosts, args: &Args) -> RemoteResult<Url> {
        self.validate(args)?;

        let base = match self.host {
            Host::Api => &hosts.api,
            Host::Content => &hosts.content,
        };
        let mut url = Url::parse(base)
            .map_err(|e| RemoteError::InvalidArgument(format!("bad base URL '{}': {}", base, e)))?;

        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                RemoteError::InvalidArgument(format!("base URL '{}' cannot carry a path", base))
            })?;
            segments.pop_if_empty();
            segments.extend(self.path.split('/').filter(|s| !s.is_empty()));

            if self.path_style {
                // validated above: both are present
                let root = args.get(Opt::Root).unwrap_or_default();
                let path = args.get(Opt::Path).unwrap_or_default();
                segments.push(root);
                let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if parts.is_empty() {
                    segments.push("");
                } else {
                    segments.extend(parts);
                }
            }
        }

        let query: Vec<&(Opt, String)> = args
            .pairs
            .iter()
            .filter(|(opt, _)| !(self.path_style && matches!(opt, Opt::Root | Opt::Path)))
            .collect();
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (opt, value) in query {
                pairs.append_pair(opt.name(), value);
            }
        }

        Ok(url)
    }
}
