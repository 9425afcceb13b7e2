use crate::filter::Header;
use serde::{Deserialize, Serialize};

/// Request fields the host hands over for access logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedRequest {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    pub path_and_query: String,
    #[serde(default)]
    pub headers: Vec<Header>,
}

impl LoggedRequest {
    fn header(&self, name: &str) -> Option<String> {
        find_header(&self.headers, name)
    }
}

/// One redirect/filter decision, shaped for the host's log shipping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLog {
    pub code: u16,
    /// `Location` of the response, if any.
    pub to: Option<String>,
    /// Unix time in milliseconds, supplied by the host.
    pub time: u64,
    pub proxy: String,
    pub from: RequestLog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLog {
    #[serde(rename = "ruleId")]
    pub rule_id: Option<String>,
    pub url: String,
    pub method: Option<String>,
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub referer: Option<String>,
    #[serde(rename = "userAgent")]
    pub user_agent: Option<String>,
}

impl AccessLog {
    pub fn from_decision(
        request: &LoggedRequest,
        response_status: u16,
        response_headers: &[Header],
        rule_id: Option<&str>,
        proxy: &str,
        time: u64,
    ) -> Self {
        Self {
            code: response_status,
            to: find_header(response_headers, "location"),
            time,
            proxy: proxy.to_string(),
            from: RequestLog {
                rule_id: rule_id.map(str::to_string),
                url: request.path_and_query.clone(),
                method: request.method.clone(),
                scheme: request.scheme.clone(),
                host: request.host.clone(),
                referer: request.header("referer"),
                user_agent: request.header("user-agent"),
            },
        }
    }
}

/// Last header with `name`, ASCII case-insensitive.
fn find_header(headers: &[Header], name: &str) -> Option<String> {
    headers
        .iter()
        .rev()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_record_from_request_and_response() {
        let request = LoggedRequest {
            method: Some("GET".into()),
            scheme: Some("https".into()),
            host: Some("example.com".into()),
            path_and_query: "/old/abc?x=1".into(),
            headers: vec![
                Header::new("User-Agent", "curl/8.0"),
                Header::new("Referer", "https://search.example/"),
            ],
        };
        let log = AccessLog::from_decision(
            &request,
            301,
            &[Header::new("location", "/new/abc")],
            Some("r1"),
            "edge-1",
            1_700_000_000_000,
        );

        assert_eq!(log.code, 301);
        assert_eq!(log.to.as_deref(), Some("/new/abc"));
        assert_eq!(log.from.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(log.from.referer.as_deref(), Some("https://search.example/"));

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["from"]["ruleId"], "r1");
        assert_eq!(json["from"]["userAgent"], "curl/8.0");
        assert_eq!(json["from"]["url"], "/old/abc?x=1");
        assert_eq!(json["proxy"], "edge-1");
    }

    #[test]
    fn missing_fields_are_null() {
        let request = LoggedRequest {
            path_and_query: "/".into(),
            ..Default::default()
        };
        let log = AccessLog::from_decision(&request, 200, &[], None, "edge", 0);
        assert!(log.to.is_none());
        let json = serde_json::to_value(&log).unwrap();
        assert!(json["from"]["ruleId"].is_null());
        assert!(json["from"]["referer"].is_null());
    }
}
