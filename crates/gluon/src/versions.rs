//! Browser, engine and JavaScript engine versions reported to the page.

use gluon_cdp::BrowserVersion;
use serde::Serialize;
use serde_json::{Value, json};

/// Rendering engine family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    /// Chromium and its derivatives.
    Chromium,
    /// Gecko.
    Firefox,
}

impl BrowserEngine {
    /// Guess the engine from a `Name/version` product string.
    pub fn from_product(product: &str) -> Self {
        if product.to_ascii_lowercase().contains("firefox") {
            Self::Firefox
        } else {
            Self::Chromium
        }
    }

    /// Lowercase engine name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
        }
    }

    /// Name of the JavaScript engine the family ships.
    pub fn js_engine(self) -> &'static str {
        match self {
            Self::Chromium => "v8",
            Self::Firefox => "spidermonkey",
        }
    }
}

impl std::fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Component name.
    pub name: String,
    /// Full version string.
    pub version: String,
    /// Leading numeric component, if the version starts with one.
    pub major: Option<u32>,
}

impl VersionInfo {
    fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let version = version.into();
        let major = version.split('.').next().and_then(|m| m.parse().ok());
        Self {
            name: name.into(),
            version,
            major,
        }
    }
}

/// Versions of everything behind a window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Versions {
    /// The browser product.
    pub product: VersionInfo,
    /// The rendering engine (shares the product version).
    pub engine: VersionInfo,
    /// The JavaScript engine.
    pub js_engine: VersionInfo,
}

impl Versions {
    /// Build from a `Browser.getVersion` reply.
    ///
    /// `Chrome/121.0.6167.85` yields product version `121.0.6167.85`. A
    /// product without a `/` yields an empty version.
    pub fn from_browser(browser_name: &str, engine: BrowserEngine, info: &BrowserVersion) -> Self {
        let version = info
            .product
            .split_once('/')
            .map(|(_, v)| v)
            .unwrap_or_default();
        Self {
            product: VersionInfo::new(browser_name, version),
            engine: VersionInfo::new(engine.as_str(), version),
            js_engine: VersionInfo::new(engine.js_engine(), info.js_version.as_str()),
        }
    }

    /// Object installed as `window.Gluon.versions`.
    pub fn page_object(&self) -> Value {
        json!({
            "gluon": env!("CARGO_PKG_VERSION"),
            "builder": "gluon-rs",
            "product": self.product.name,
            "browser": self.product.version,
            "browserType": self.engine.name,
            "js": {
                "engine": self.js_engine.name,
                "browser": self.js_engine.version,
            },
        })
    }
}
