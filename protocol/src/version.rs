//! Node version string: `<os>_<software>_<net>`.

use serde::{Deserialize, Serialize};

/// Which chain the node belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetKind {
    Primary,
    Test,
    #[default]
    Dev,
}

impl NetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetKind::Primary => "p",
            NetKind::Test => "t",
            NetKind::Dev => "d",
        }
    }
}

fn os_code() -> &'static str {
    match std::env::consts::OS {
        "linux" => "1",
        "windows" => "2",
        "ios" => "3",
        "android" => "4",
        _ => "0",
    }
}

/// The version string a node advertises in its directory entry.
pub fn node_version(net: NetKind) -> String {
    format!("{}_{}_{}", os_code(), env!("CARGO_PKG_VERSION"), net.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_has_three_parts() {
        let version = node_version(NetKind::Test);
        let parts: Vec<&str> = version.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], env!("CARGO_PKG_VERSION"));
        assert_eq!(parts[2], "t");
    }
}
