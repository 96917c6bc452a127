//! Utility functions for comparing and rendering X.509 names

use const_oid::db::rfc4519::CN;
use der::{asn1::Any, Encode, Tag, Tagged};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RelativeDistinguishedName};

/// name_to_string returns the RFC 4514 rendering of a name (most specific RDN first).
pub fn name_to_string(name: &Name) -> String {
    name.to_string()
}

/// name_to_forward_string returns a rendering of a name with RDNs in encoded order (least
/// specific RDN first), i.e., the reverse of [`name_to_string`].
pub fn name_to_forward_string(name: &Name) -> String {
    name.0
        .iter()
        .map(|rdn| rdn.to_string())
        .collect::<Vec<String>>()
        .join(",")
}

/// attribute_value_to_string returns the value of a directory string attribute as a `String`, or
/// None when the value is not a string type.
pub fn attribute_value_to_string(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String
        | Tag::PrintableString
        | Tag::Ia5String
        | Tag::TeletexString
        | Tag::VisibleString => core::str::from_utf8(value.value())
            .ok()
            .map(|s| s.to_string()),
        _ => None,
    }
}

// trims, collapses internal whitespace and folds case
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

fn compare_atvs(left: &AttributeTypeAndValue, right: &AttributeTypeAndValue) -> bool {
    if left.oid != right.oid {
        return false;
    }
    match (
        attribute_value_to_string(&left.value),
        attribute_value_to_string(&right.value),
    ) {
        (Some(l), Some(r)) => normalize(&l) == normalize(&r),
        _ => match (left.value.to_der(), right.value.to_der()) {
            (Ok(l), Ok(r)) => l == r,
            _ => false,
        },
    }
}

fn compare_rdns(left: &RelativeDistinguishedName, right: &RelativeDistinguishedName) -> bool {
    if left.0.len() != right.0.len() {
        return false;
    }
    left.0
        .iter()
        .all(|l| right.0.iter().any(|r| compare_atvs(l, r)))
}

/// compare_names compares two names RDN by RDN. String attribute values are compared without
/// regard to case or redundant whitespace, other values are compared by encoding.
pub fn compare_names(left: &Name, right: &Name) -> bool {
    if left == right {
        return true;
    }
    if left.0.len() != right.0.len() {
        return false;
    }
    left.0
        .iter()
        .zip(right.0.iter())
        .all(|(l, r)| compare_rdns(l, r))
}

/// get_common_names returns the values of all common name attributes present in a name, in
/// encoded order.
pub fn get_common_names(name: &Name) -> Vec<String> {
    let mut retval = vec![];
    for rdn in name.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid == CN {
                if let Some(s) = attribute_value_to_string(&atv.value) {
                    retval.push(s);
                }
            }
        }
    }
    retval
}

/// get_leaf_common_name returns the last common name in a name (i.e., the common name from the most
/// specific RDN that has one).
pub fn get_leaf_common_name(name: &Name) -> Option<String> {
    get_common_names(name).pop()
}
