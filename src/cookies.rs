use std::cell::RefCell;
use std::rc::Rc;
use std::sync::OnceLock;

use fancy_regex::Regex;
use url::Url;

use crate::{Error, Result};

/// Caller overrides merged over the jar's fixed defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CookieJarOptions {
    pub loose_mode: Option<bool>,
}

impl CookieJarOptions {
    const DEFAULT_LOOSE_MODE: bool = true;

    fn resolved_loose_mode(&self) -> bool {
        self.loose_mode.unwrap_or(Self::DEFAULT_LOOSE_MODE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    host_only: bool,
    path: String,
    secure: bool,
    http_only: bool,
    order: u64,
}

#[derive(Debug, Default)]
struct CookieStore {
    cookies: Vec<StoredCookie>,
    next_order: u64,
}

/// Cookie storage shared by handle; loose mode is on unless the caller
/// explicitly turns it off.
#[derive(Debug, Clone)]
pub struct CookieJar {
    store: Rc<RefCell<CookieStore>>,
    loose_mode: bool,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieJar {
    pub fn new() -> Self {
        Self::with_options(CookieJarOptions::default())
    }

    pub fn with_options(options: CookieJarOptions) -> Self {
        Self {
            store: Rc::new(RefCell::new(CookieStore::default())),
            loose_mode: options.resolved_loose_mode(),
        }
    }

    pub fn loose_mode(&self) -> bool {
        self.loose_mode
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }

    pub fn set_cookie(&self, cookie: &str, url: &str) -> Result<()> {
        let url = Url::parse(url)
            .map_err(|_| Error::InvalidCookie(format!("cannot set cookies for \"{url}\"")))?;
        self.set_cookie_for(cookie, &url, true)
    }

    pub fn get_cookie_string(&self, url: &str) -> Result<String> {
        let url = Url::parse(url)
            .map_err(|_| Error::InvalidCookie(format!("cannot read cookies for \"{url}\"")))?;
        Ok(self.cookie_string_for(&url, true))
    }

    /// `document.cookie` writes: HttpOnly cookies are refused.
    pub(crate) fn set_cookie_for(&self, cookie: &str, url: &Url, http: bool) -> Result<()> {
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::InvalidCookie(format!("\"{url}\" has no host")))?
            .to_ascii_lowercase();

        let mut parts = cookie.split(';');
        let pair = parts.next().unwrap_or_default();
        let (name, value) = match pair.find('=') {
            Some(eq) => (pair[..eq].trim().to_string(), pair[eq + 1..].trim().to_string()),
            None if self.loose_mode => (String::new(), pair.trim().to_string()),
            None => {
                return Err(Error::InvalidCookie(format!(
                    "\"{pair}\" has no name=value pair"
                )));
            }
        };
        if name.is_empty() && value.is_empty() {
            return Err(Error::InvalidCookie("empty cookie".into()));
        }
        if !self.loose_mode && !is_cookie_token(&name) {
            return Err(Error::InvalidCookie(format!("invalid cookie name \"{name}\"")));
        }

        let mut domain = None;
        let mut path = None;
        let mut secure = false;
        let mut http_only = false;
        let mut expire_now = false;
        for attr in parts {
            let (key, attr_value) = match attr.find('=') {
                Some(eq) => (attr[..eq].trim(), attr[eq + 1..].trim()),
                None => (attr.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" if !attr_value.is_empty() => {
                    domain = Some(attr_value.trim_start_matches('.').to_ascii_lowercase());
                }
                "path" if attr_value.starts_with('/') => path = Some(attr_value.to_string()),
                "max-age" => {
                    if let Ok(seconds) = attr_value.parse::<i64>() {
                        expire_now = seconds <= 0;
                    }
                }
                "secure" => secure = true,
                "httponly" => http_only = true,
                _ => {}
            }
        }

        if http_only && !http {
            return Ok(());
        }

        let host_only = domain.is_none();
        let domain = match domain {
            Some(domain) if domain_matches(&host, &domain) => domain,
            Some(domain) => {
                return Err(Error::InvalidCookie(format!(
                    "domain \"{domain}\" does not match host \"{host}\""
                )));
            }
            None => host,
        };
        let path = path.unwrap_or_else(|| default_path(url.path()));

        let mut store = self.store.borrow_mut();
        let existing = store
            .cookies
            .iter()
            .position(|c| c.name == name && c.domain == domain && c.path == path);
        if expire_now {
            if let Some(index) = existing {
                store.cookies.remove(index);
            }
            return Ok(());
        }

        let order = match existing {
            Some(index) => store.cookies.remove(index).order,
            None => {
                store.next_order += 1;
                store.next_order
            }
        };
        store.cookies.push(StoredCookie {
            name,
            value,
            domain,
            host_only,
            path,
            secure,
            http_only,
            order,
        });
        Ok(())
    }

    pub(crate) fn cookie_string_for(&self, url: &Url, http: bool) -> String {
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return String::new();
        };
        let request_path = if url.path().is_empty() { "/" } else { url.path() };
        let secure_channel = url.scheme() == "https";

        let store = self.store.borrow();
        let mut matched = store
            .cookies
            .iter()
            .filter(|c| {
                if c.host_only {
                    c.domain == host
                } else {
                    domain_matches(&host, &c.domain)
                }
            })
            .filter(|c| path_matches(request_path, &c.path))
            .filter(|c| !c.secure || secure_channel)
            .filter(|c| http || !c.http_only)
            .collect::<Vec<_>>();
        matched.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.order.cmp(&b.order)));

        matched
            .iter()
            .map(|c| {
                if c.name.is_empty() {
                    c.value.clone()
                } else {
                    format!("{}={}", c.name, c.value)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn cookie_token_regex() -> Option<&'static Regex> {
    static TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
    TOKEN
        .get_or_init(|| Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$").ok())
        .as_ref()
}

fn is_cookie_token(name: &str) -> bool {
    cookie_token_regex()
        .and_then(|re| re.is_match(name).ok())
        .unwrap_or(false)
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}

fn default_path(url_path: &str) -> String {
    if !url_path.starts_with('/') {
        return "/".into();
    }
    match url_path.rfind('/') {
        Some(0) | None => "/".into(),
        Some(last) => url_path[..last].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_jar_accepts_nameless_cookies() -> Result<()> {
        let jar = CookieJar::new();
        jar.set_cookie("foo", "http://example.com/")?;
        assert_eq!(jar.get_cookie_string("http://example.com/")?, "foo");
        Ok(())
    }

    #[test]
    fn strict_jar_rejects_nameless_cookies() {
        let jar = CookieJar::with_options(CookieJarOptions {
            loose_mode: Some(false),
        });
        assert!(!jar.loose_mode());
        assert!(matches!(
            jar.set_cookie("foo", "http://example.com/"),
            Err(Error::InvalidCookie(_))
        ));
    }

    #[test]
    fn cookies_are_scoped_by_host_and_path() -> Result<()> {
        let jar = CookieJar::new();
        jar.set_cookie("a=1", "http://example.com/")?;
        jar.set_cookie("b=2; Path=/docs", "http://example.com/")?;
        jar.set_cookie("c=3", "http://other.test/")?;
        assert_eq!(jar.get_cookie_string("http://example.com/docs/x")?, "b=2; a=1");
        assert_eq!(jar.get_cookie_string("http://example.com/")?, "a=1");
        assert_eq!(jar.get_cookie_string("http://other.test/")?, "c=3");
        Ok(())
    }

    #[test]
    fn max_age_zero_removes_cookie() -> Result<()> {
        let jar = CookieJar::new();
        jar.set_cookie("a=1", "http://example.com/")?;
        jar.set_cookie("a=1; Max-Age=0", "http://example.com/")?;
        assert_eq!(jar.get_cookie_string("http://example.com/")?, "");
        Ok(())
    }

    #[test]
    fn clones_share_one_store() -> Result<()> {
        let jar = CookieJar::new();
        let other = jar.clone();
        other.set_cookie("k=v", "http://example.com/")?;
        assert!(jar.ptr_eq(&other));
        assert_eq!(jar.get_cookie_string("http://example.com/")?, "k=v");
        Ok(())
    }

    #[test]
    fn opaque_urls_cannot_hold_cookies() {
        let jar = CookieJar::new();
        assert!(jar.set_cookie("a=1", "about:blank").is_err());
    }
}
