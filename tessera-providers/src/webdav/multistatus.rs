// SPDX-License-Identifier: AGPL-3.0-or-later
//! PROPFIND/PROPPATCH bodies and multistatus parsing
//!
//! Small scanner instead of a full XML parser: elements are matched on their
//! local name so any namespace prefix (`d:`, `D:`, `lp1:`, none) works.

use tessera_core::{NativeError, NativeResult};

use super::{DavResource, LINK_TARGET_NAMESPACE, LINK_TARGET_PROPERTY};

/// PROPFIND body asking for the resource type and the link target property.
pub fn propfind_body() -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:t="{ns}">
  <d:prop>
    <d:resourcetype/>
    <t:{name}/>
  </d:prop>
</d:propfind>"#,
        ns = LINK_TARGET_NAMESPACE,
        name = LINK_TARGET_PROPERTY
    )
}

/// PROPPATCH body setting one dead property.
pub fn proppatch_body(namespace: &str, name: &str, value: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:propertyupdate xmlns:d="DAV:" xmlns:p="{ns}">
  <d:set>
    <d:prop>
      <p:{name}>{value}</p:{name}>
    </d:prop>
  </d:set>
</d:propertyupdate>"#,
        ns = escape(namespace),
        name = name,
        value = escape(value)
    )
}

/// Parse a multistatus response into one [`DavResource`] per `<response>`.
///
/// Only properties reported in a `200` propstat count.
pub fn parse_multistatus(xml: &str) -> NativeResult<Vec<DavResource>> {
    let mut resources = Vec::new();
    for response in elements(xml, "response") {
        let href = element(response, "href")
            .map(|href| unescape(href.trim()))
            .ok_or_else(|| NativeError::Other("multistatus response without href".into()))?;

        let mut resource = DavResource { href, ..Default::default() };
        let mut propstats = elements(response, "propstat").peekable();
        if propstats.peek().is_none() {
            read_props(response, &mut resource);
        }
        for propstat in propstats {
            let succeeded = element(propstat, "status").map_or(true, |status| status.contains(" 200"));
            if succeeded {
                read_props(propstat, &mut resource);
            }
        }
        resources.push(resource);
    }
    Ok(resources)
}

/// First non-2xx `<status>` line of a multistatus body.
pub fn failed_status(xml: &str) -> Option<String> {
    elements(xml, "status").map(str::trim).find_map(|status| {
        let code = status.split_whitespace().nth(1)?;
        (!code.starts_with('2')).then(|| status.to_string())
    })
}

fn read_props(xml: &str, resource: &mut DavResource) {
    if let Some(resource_type) = element(xml, "resourcetype") {
        resource.is_collection |= element(resource_type, "collection").is_some();
    }
    if let Some(target) = element(xml, LINK_TARGET_PROPERTY) {
        let target = unescape(target.trim());
        if !target.is_empty() {
            resource.link_target = Some(target);
        }
    }
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

/// Content of the next element named `local` at or after `from`, and the
/// position just past it.
fn next_element<'a>(xml: &'a str, local: &str, from: usize) -> Option<(&'a str, usize)> {
    let mut pos = from;
    while let Some(offset) = xml[pos..].find('<') {
        let start = pos + offset;
        let tag = &xml[start + 1..];
        let name_len = tag
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(tag.len());
        let qualified = &tag[..name_len];
        let open_end = start + 1 + tag.find('>')?;

        if !qualified.is_empty() && local_name(qualified) == local {
            if xml[..open_end].ends_with('/') {
                return Some(("", open_end + 1));
            }
            let content_start = open_end + 1;
            let close = format!("</{}", qualified);
            let close_at = content_start + xml[content_start..].find(&close)?;
            let end = close_at + xml[close_at..].find('>')? + 1;
            return Some((&xml[content_start..close_at], end));
        }
        pos = start + 1;
    }
    None
}

fn element<'a>(xml: &'a str, local: &str) -> Option<&'a str> {
    next_element(xml, local, 0).map(|(content, _)| content)
}

fn elements<'a>(xml: &'a str, local: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let mut pos = 0;
    std::iter::from_fn(move || {
        let (content, end) = next_element(xml, local, pos)?;
        pos = end;
        Some(content)
    })
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else { break };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
