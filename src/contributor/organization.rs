//! Corporate affiliation of contributors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Known corporate affiliations, serialized by variant name.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Organization {
    /// Arista.
    ANET,
    /// Broadcom.
    AVGO,
    /// Alibaba.
    BABA,
    /// Cisco.
    CSCO,
    /// Dell Technologies.
    DELL,
    /// HCL Technologies.
    HCLTECH,
    /// Intel.
    INTC,
    /// Juniper.
    JNPR,
    /// Keysight Technologies.
    KEYS,
    /// Marvell Technology.
    MRVL,
    /// Microsoft.
    MSFT,
    /// Nokia.
    NOK,
    /// Nvidia.
    NVDA,
    /// Nexthop AI.
    NXHP,
    /// Orange.
    ORANY,
    /// Anything else.
    #[default]
    OTHER,
}

impl Organization {
    /// Company name of the organization.
    pub fn company_name(self) -> &'static str {
        match self {
            Self::ANET => "Arista",
            Self::AVGO => "Broadcom",
            Self::BABA => "Alibaba Inc",
            Self::CSCO => "Cisco",
            Self::DELL => "Dell technologies",
            Self::HCLTECH => "HCL Technologies Ltd",
            Self::INTC => "Intel Corporation",
            Self::JNPR => "Juniper",
            Self::KEYS => "Keysight Technologies",
            Self::MRVL => "Marvell Technology Inc",
            Self::MSFT => "Microsoft",
            Self::NOK => "Nokia",
            Self::NVDA => "Nvidia",
            Self::NXHP => "Nexthop AI",
            Self::ORANY => "Orange",
            Self::OTHER => "Other",
        }
    }
}

impl fmt::Display for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.company_name())
    }
}

const DOMAINS: &[(&str, Organization)] = &[
    ("alibaba.com", Organization::BABA),
    ("alibaba-inc.com", Organization::BABA),
    ("broadcom.com", Organization::AVGO),
    ("dell.com", Organization::DELL),
    ("microsoft.com", Organization::MSFT),
    ("nvidia.com", Organization::NVDA),
    ("mellanox.com", Organization::NVDA),
    ("marvell.com", Organization::MRVL),
    ("nexthop.ai", Organization::NXHP),
    ("orange.com", Organization::ORANY),
    ("nokia.com", Organization::NOK),
    ("cisco.com", Organization::CSCO),
    ("arista.com", Organization::ANET),
    ("keysight.com", Organization::KEYS),
    ("hcltech.com", Organization::HCLTECH),
    ("intel.com", Organization::INTC),
];

// Checked in order; the first keyword found in the company text wins.
const COMPANY_KEYWORDS: &[(&[&str], Organization)] = &[
    (&["nvidia", "mellanox", "nvda", "mlnx"], Organization::NVDA),
    (&["microsoft", "azure", "msft"], Organization::MSFT),
    (&["cisco"], Organization::CSCO),
    (&["arista"], Organization::ANET),
    (&["keysight"], Organization::KEYS),
    (&["marvell"], Organization::MRVL),
    (&["dell"], Organization::DELL),
    (&["alibaba"], Organization::BABA),
    (&["broadcom"], Organization::AVGO),
    (&["nokia"], Organization::NOK),
    (&["nexthop"], Organization::NXHP),
    (&["orange"], Organization::ORANY),
    (&["juniper"], Organization::JNPR),
];

const LOGIN_SUFFIXES: &[(&str, Organization)] = &[
    ("arista", Organization::ANET),
    ("ms", Organization::MSFT),
    ("nv", Organization::NVDA),
    ("mlnx", Organization::NVDA),
    ("hcl", Organization::HCLTECH),
    ("brcm", Organization::AVGO),
    ("bcm", Organization::AVGO),
    ("nexthop", Organization::NXHP),
    ("keys", Organization::KEYS),
];

/// Organization of the first e-mail whose domain is a known company domain.
pub fn by_emails<'a>(emails: impl IntoIterator<Item = &'a str>) -> Organization {
    emails
        .into_iter()
        .filter_map(|email| email.rsplit_once('@').map(|(_, domain)| domain))
        .find_map(|domain| {
            DOMAINS
                .iter()
                .find(|(known, _)| domain.eq_ignore_ascii_case(known))
                .map(|(_, org)| *org)
        })
        .unwrap_or_default()
}

/// Organization named by a free-text company field.
pub fn by_company(company: &str) -> Organization {
    let company = company.to_lowercase();
    COMPANY_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| company.contains(k)))
        .map(|(_, org)| *org)
        .unwrap_or_default()
}

/// Organization hinted by a login suffix such as `john-ms` or `JaneNv`.
///
/// The suffix must be separated from the rest of the login by punctuation
/// or by a change of letter case.
pub fn by_login_suffix(login: &str) -> Organization {
    let chars: Vec<char> = login.chars().collect();
    for (suffix, org) in LOGIN_SUFFIXES {
        let len = suffix.len();
        if chars.len() <= len {
            continue;
        }
        let tail: String = chars[chars.len() - len..].iter().collect();
        if !tail.eq_ignore_ascii_case(suffix) {
            continue;
        }

        let before = chars[chars.len() - len - 1];
        let first = chars[chars.len() - len];
        if !before.is_alphanumeric() {
            return *org;
        }
        if before.is_alphabetic()
            && first.is_alphabetic()
            && (before.is_lowercase() ^ first.is_lowercase())
        {
            return *org;
        }
    }
    Organization::OTHER
}

/// Derives an organization: explicit override, then e-mail domains, then
/// the company field, then the login suffix.
pub fn derive<'a>(
    explicit: Option<Organization>,
    emails: impl IntoIterator<Item = &'a str>,
    company: Option<&str>,
    login: Option<&str>,
) -> Organization {
    if let Some(org) = explicit {
        return org;
    }

    let candidates = [
        by_emails(emails),
        company.map_or(Organization::OTHER, by_company),
        login.map_or(Organization::OTHER, by_login_suffix),
    ];
    candidates
        .into_iter()
        .find(|org| *org != Organization::OTHER)
        .unwrap_or_default()
}
