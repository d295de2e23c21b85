//! Fixed webHDFS operation vocabulary (§4.C), grounded on `DatalakeRESTInterface.ends`
//! in `lib.py`: each operation maps to an HTTP method plus required/allowed
//! query parameter sets, enforced client-side before a request is ever sent.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Patch,
}

impl Method {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Append,
    CheckAccess,
    Concat,
    MsConcat,
    Create,
    Delete,
    GetContentSummary,
    GetFileStatus,
    ListStatus,
    Mkdirs,
    Open,
    Rename,
    SetOwner,
    SetPermission,
    SetExpiry,
    SetAcl,
    ModifyAclEntries,
    RemoveAclEntries,
    RemoveAcl,
    MsGetAclStatus,
    RemoveDefaultAcl,
}

pub struct OpSpec {
    pub method: Method,
    pub required: &'static [&'static str],
    pub allowed: &'static [&'static str],
    /// True for operations served under `webhdfsext/` instead of `webhdfs/v1/`.
    pub is_extended: bool,
}

impl Op {
    pub fn name(self) -> &'static str {
        match self {
            Op::Append => "APPEND",
            Op::CheckAccess => "CHECKACCESS",
            Op::Concat => "CONCAT",
            Op::MsConcat => "MSCONCAT",
            Op::Create => "CREATE",
            Op::Delete => "DELETE",
            Op::GetContentSummary => "GETCONTENTSUMMARY",
            Op::GetFileStatus => "GETFILESTATUS",
            Op::ListStatus => "LISTSTATUS",
            Op::Mkdirs => "MKDIRS",
            Op::Open => "OPEN",
            Op::Rename => "RENAME",
            Op::SetOwner => "SETOWNER",
            Op::SetPermission => "SETPERMISSION",
            Op::SetExpiry => "SETEXPIRY",
            Op::SetAcl => "SETACL",
            Op::ModifyAclEntries => "MODIFYACLENTRIES",
            Op::RemoveAclEntries => "REMOVEACLENTRIES",
            Op::RemoveAcl => "REMOVEACL",
            Op::MsGetAclStatus => "MSGETACLSTATUS",
            Op::RemoveDefaultAcl => "REMOVEDEFAULTACL",
        }
    }

    pub fn spec(self) -> OpSpec {
        use Method::*;
        match self {
            Op::Append => OpSpec {
                method: Post,
                required: &[],
                allowed: &["append", "offset", "syncFlag", "filesessionid", "leaseid"],
                is_extended: false,
            },
            Op::CheckAccess => OpSpec {
                method: Get,
                required: &[],
                allowed: &["fsaction"],
                is_extended: false,
            },
            Op::Concat => OpSpec {
                method: Post,
                required: &["sources"],
                allowed: &["sources"],
                is_extended: false,
            },
            Op::MsConcat => OpSpec {
                method: Post,
                required: &[],
                allowed: &["deleteSourceDirectory"],
                is_extended: false,
            },
            Op::Create => OpSpec {
                method: Put,
                required: &[],
                allowed: &["overwrite", "write", "syncFlag", "filesessionid", "leaseid"],
                is_extended: false,
            },
            Op::Delete => OpSpec {
                method: Delete,
                required: &[],
                allowed: &["recursive"],
                is_extended: false,
            },
            Op::GetContentSummary => OpSpec {
                method: Get,
                required: &[],
                allowed: &[],
                is_extended: false,
            },
            Op::GetFileStatus => OpSpec {
                method: Get,
                required: &[],
                allowed: &[],
                is_extended: false,
            },
            Op::ListStatus => OpSpec {
                method: Get,
                required: &[],
                allowed: &["listSize", "listAfter"],
                is_extended: false,
            },
            Op::Mkdirs => OpSpec {
                method: Put,
                required: &[],
                allowed: &[],
                is_extended: false,
            },
            Op::Open => OpSpec {
                method: Get,
                required: &[],
                allowed: &["offset", "length", "read", "filesessionid"],
                is_extended: false,
            },
            Op::Rename => OpSpec {
                method: Put,
                required: &["destination"],
                allowed: &["destination"],
                is_extended: false,
            },
            Op::SetOwner => OpSpec {
                method: Put,
                required: &[],
                allowed: &["owner", "group"],
                is_extended: false,
            },
            Op::SetPermission => OpSpec {
                method: Put,
                required: &[],
                allowed: &["permission"],
                is_extended: false,
            },
            Op::SetExpiry => OpSpec {
                method: Put,
                required: &["expiryOption"],
                allowed: &["expiryOption", "expireTime"],
                is_extended: true,
            },
            Op::SetAcl => OpSpec {
                method: Put,
                required: &["aclSpec"],
                allowed: &["aclSpec"],
                is_extended: false,
            },
            Op::ModifyAclEntries => OpSpec {
                method: Put,
                required: &["aclSpec"],
                allowed: &["aclSpec"],
                is_extended: false,
            },
            Op::RemoveAclEntries => OpSpec {
                method: Put,
                required: &["aclSpec"],
                allowed: &["aclSpec"],
                is_extended: false,
            },
            Op::RemoveAcl => OpSpec {
                method: Put,
                required: &[],
                allowed: &[],
                is_extended: false,
            },
            Op::MsGetAclStatus => OpSpec {
                method: Get,
                required: &[],
                allowed: &[],
                is_extended: false,
            },
            Op::RemoveDefaultAcl => OpSpec {
                method: Put,
                required: &[],
                allowed: &[],
                is_extended: false,
            },
        }
    }
}

/// Validate a caller-supplied parameter set against an op's required/allowed
/// sets. `api-version` is always allowed (added by the caller separately).
pub fn validate_params(op: Op, keys: &HashSet<&str>) -> Result<(), crate::error::Error> {
    let spec = op.spec();
    let required: HashSet<&str> = spec.required.iter().copied().collect();
    let mut allowed: HashSet<&str> = spec.allowed.iter().copied().collect();
    allowed.insert("api-version");

    let missing: Vec<&str> = required.difference(keys).copied().collect();
    if !missing.is_empty() {
        return Err(crate::error::Error::Validation(format!(
            "{}: required parameters missing: {:?}",
            op.name(),
            missing
        )));
    }
    let extra: Vec<&str> = keys.difference(&allowed).copied().collect();
    if !extra.is_empty() {
        return Err(crate::error::Error::Validation(format!(
            "{}: extra parameters given: {:?}",
            op.name(),
            extra
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_requires_destination() {
        let keys: HashSet<&str> = HashSet::new();
        assert!(validate_params(Op::Rename, &keys).is_err());
        let mut keys2 = HashSet::new();
        keys2.insert("destination");
        assert!(validate_params(Op::Rename, &keys2).is_ok());
    }

    #[test]
    fn unknown_param_rejected() {
        let mut keys = HashSet::new();
        keys.insert("bogus");
        assert!(validate_params(Op::Mkdirs, &keys).is_err());
    }

    #[test]
    fn setexpiry_is_extended_path() {
        assert!(Op::SetExpiry.spec().is_extended);
        assert!(!Op::Mkdirs.spec().is_extended);
    }
}
