pub type Headers = Vec<(String, String)>;

pub fn set_bearer(headers: &mut Headers, token: &str) {
    headers.push(("authorization".to_string(), format!("Bearer {token}")));
}

pub fn set_api_key(headers: &mut Headers, key: &str) {
    headers.push(("x-api-key".to_string(), key.to_string()));
}

pub fn set_content_type_json(headers: &mut Headers) {
    headers.push(("content-type".to_string(), "application/json".to_string()));
}

pub fn set_accept_json(headers: &mut Headers) {
    headers.push(("accept".to_string(), "application/json".to_string()));
}

pub fn header_get<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
