//! # Canonical Invoice Serialization
//!
//! Produces the byte-exact canonical JSON an invoice is attested under. The
//! `CanonicalBytes` newtype has a private inner field: the only way to
//! construct it is [`CanonicalBytes::from_invoice`], which applies the full
//! canonicalization pipeline before compact serialization, so digests can
//! never be computed over bytes that took another path.
//!
//! ## Canonical form
//!
//! - Top-level sections in fixed order: identity fields, `sellerInfo`,
//!   `customerInfo`, `invoiceDetails`, `lines[]`, `metadata`.
//! - Keys are lower-camel-case; output is compact (no insignificant
//!   whitespace); absent optional values serialize as `null`.
//! - Decimals are rendered as fixed-scale strings (money at scale 2,
//!   quantity at scale 4, tax rate at scale 2), never as JSON floats.
//! - `metadata.createdAt` is the invoice creation instant as
//!   `YYYY-MM-DDTHH:MM:SS.sssZ`; `metadata.version` is `"1.0"`.
//!
//! Two semantically equal invoices always canonicalize to identical bytes;
//! key order is fixed by struct field declaration order, not by any
//! serializer default.

use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::digest;
use crate::error::CanonicalizationError;
use crate::model::{ContactInfo, Invoice, InvoiceLine};

/// Canonical serialization version tag.
const CANONICAL_VERSION: &str = "1.0";

/// Bytes produced exclusively by invoice canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize an invoice and its line items.
    ///
    /// `lines` may arrive in any order; they are emitted ascending by
    /// `line_number`. Duplicate line numbers and lines belonging to another
    /// invoice are rejected.
    pub fn from_invoice(
        invoice: &Invoice,
        lines: &[InvoiceLine],
    ) -> Result<Self, CanonicalizationError> {
        let mut ordered: Vec<&InvoiceLine> = lines.iter().collect();
        ordered.sort_by_key(|l| l.line_number);
        for pair in ordered.windows(2) {
            if pair[0].line_number == pair[1].line_number {
                return Err(CanonicalizationError::DuplicateLineNumber {
                    invoice_id: invoice.id,
                    line_number: pair[0].line_number,
                });
            }
        }
        for line in &ordered {
            if line.invoice_id != invoice.id {
                return Err(CanonicalizationError::ForeignLine {
                    line_id: line.id,
                    actual: line.invoice_id,
                    expected: invoice.id,
                });
            }
        }

        let view = CanonicalInvoice {
            invoice_id: invoice.id,
            invoice_number: &invoice.invoice_number,
            form_number: invoice.form_number.as_deref(),
            serial: invoice.serial.as_deref(),
            seller_info: CanonicalParty::from(&invoice.seller),
            customer_info: CanonicalParty::from(&invoice.customer),
            invoice_details: CanonicalDetails {
                issued_date: invoice.issued_date.format("%Y-%m-%d").to_string(),
                currency: &invoice.currency,
                sub_total: money(&invoice.sub_total),
                tax_amount: money(&invoice.tax_amount),
                discount_amount: money(&invoice.discount_amount),
                total_amount: money(&invoice.total_amount),
                note: invoice.note.as_deref(),
            },
            lines: ordered.iter().map(|l| CanonicalLine::from(*l)).collect(),
            metadata: CanonicalMetadata {
                created_at: invoice
                    .created_at
                    .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                    .to_string(),
                version: CANONICAL_VERSION,
            },
        };

        Ok(Self(serde_json::to_vec(&view)?))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// SHA-256 of the canonical bytes, lowercase hex: the invoice's
    /// `immutable_hash`.
    pub fn sha256_hex(&self) -> String {
        digest::sha256_hex(&self.0)
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Render a monetary decimal at scale 2.
fn money(value: &BigDecimal) -> String {
    value.with_scale(2).to_string()
}

/// Render a quantity decimal at scale 4.
fn quantity(value: &BigDecimal) -> String {
    value.with_scale(4).to_string()
}

/// Render a tax rate decimal at scale 2.
fn rate(value: &BigDecimal) -> String {
    value.with_scale(2).to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalInvoice<'a> {
    invoice_id: i64,
    invoice_number: &'a str,
    form_number: Option<&'a str>,
    serial: Option<&'a str>,
    seller_info: CanonicalParty<'a>,
    customer_info: CanonicalParty<'a>,
    invoice_details: CanonicalDetails<'a>,
    lines: Vec<CanonicalLine<'a>>,
    metadata: CanonicalMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalParty<'a> {
    name: &'a str,
    tax_id: Option<&'a str>,
    address: Option<&'a str>,
    email: Option<&'a str>,
    phone: Option<&'a str>,
}

impl<'a> From<&'a ContactInfo> for CanonicalParty<'a> {
    fn from(contact: &'a ContactInfo) -> Self {
        Self {
            name: &contact.name,
            tax_id: contact.tax_id.as_deref(),
            address: contact.address.as_deref(),
            email: contact.email.as_deref(),
            phone: contact.phone.as_deref(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalDetails<'a> {
    issued_date: String,
    currency: &'a str,
    sub_total: String,
    tax_amount: String,
    discount_amount: String,
    total_amount: String,
    note: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalLine<'a> {
    line_number: i32,
    description: &'a str,
    unit: Option<&'a str>,
    quantity: String,
    unit_price: String,
    discount: String,
    tax_rate: String,
    tax_amount: String,
    line_total: String,
}

impl<'a> From<&'a InvoiceLine> for CanonicalLine<'a> {
    fn from(line: &'a InvoiceLine) -> Self {
        Self {
            line_number: line.line_number,
            description: &line.description,
            unit: line.unit.as_deref(),
            quantity: quantity(&line.quantity),
            unit_price: money(&line.unit_price),
            discount: money(&line.discount),
            tax_rate: rate(&line.tax_rate),
            tax_amount: money(&line.tax_amount),
            line_total: money(&line.line_total),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalMetadata {
    created_at: String,
    version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::InvoiceStatus;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn sample_invoice() -> Invoice {
        Invoice {
            id: 42,
            invoice_number: "INV-2026-0042".into(),
            form_number: Some("F-01".into()),
            serial: Some("AA".into()),
            tenant_org_id: Some(7),
            issued_by_user_id: Some(3),
            seller: ContactInfo {
                name: "Helios Trading Ltd".into(),
                tax_id: Some("0312456789".into()),
                address: Some("12 Dock Road".into()),
                email: Some("billing@helios.example".into()),
                phone: None,
            },
            customer: ContactInfo {
                name: "Borealis GmbH".into(),
                tax_id: Some("DE814433022".into()),
                address: None,
                email: None,
                phone: None,
            },
            status: InvoiceStatus::Uploaded,
            issued_date: chrono::Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap(),
            sub_total: dec("1000"),
            tax_amount: dec("100.5"),
            discount_amount: dec("0"),
            total_amount: dec("1100.50"),
            currency: "EUR".into(),
            note: None,
            batch_id: None,
            immutable_hash: None,
            cid: None,
            cid_hash: None,
            merkle_proof: None,
            created_at: chrono::Utc
                .with_ymd_and_hms(2026, 3, 14, 9, 30, 12)
                .unwrap()
                + chrono::Duration::milliseconds(345),
            updated_at: chrono::Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 12).unwrap(),
        }
    }

    fn sample_lines() -> Vec<InvoiceLine> {
        vec![
            InvoiceLine {
                id: 2,
                invoice_id: 42,
                line_number: 2,
                description: "Freight".into(),
                unit: None,
                quantity: dec("1"),
                unit_price: dec("100.5"),
                discount: dec("0"),
                tax_rate: dec("10"),
                tax_amount: dec("10.05"),
                line_total: dec("110.55"),
            },
            InvoiceLine {
                id: 1,
                invoice_id: 42,
                line_number: 1,
                description: "Solar panel".into(),
                unit: Some("pcs".into()),
                quantity: dec("4.5"),
                unit_price: dec("200"),
                discount: dec("0"),
                tax_rate: dec("10"),
                tax_amount: dec("90.00"),
                line_total: dec("990.00"),
            },
        ]
    }

    #[test]
    fn canonicalization_is_deterministic() {
        let invoice = sample_invoice();
        let lines = sample_lines();
        let a = CanonicalBytes::from_invoice(&invoice, &lines).unwrap();
        let mut reversed = lines.clone();
        reversed.reverse();
        let b = CanonicalBytes::from_invoice(&invoice, &reversed).unwrap();
        assert_eq!(a, b, "line order must not affect canonical bytes");
        assert_eq!(a.sha256_hex(), b.sha256_hex());
    }

    #[test]
    fn key_order_and_scales_are_fixed() {
        let invoice = sample_invoice();
        let bytes = CanonicalBytes::from_invoice(&invoice, &sample_lines()).unwrap();
        let text = std::str::from_utf8(bytes.as_bytes()).unwrap().to_string();

        let section_order = [
            "\"invoiceId\"",
            "\"sellerInfo\"",
            "\"customerInfo\"",
            "\"invoiceDetails\"",
            "\"lines\"",
            "\"metadata\"",
        ];
        let mut last = 0;
        for key in section_order {
            let pos = text.find(key).unwrap_or_else(|| panic!("missing {key}"));
            assert!(pos > last || last == 0, "{key} out of order");
            last = pos;
        }

        // Money at scale 2, quantity at scale 4, no whitespace.
        assert!(text.contains("\"subTotal\":\"1000.00\""));
        assert!(text.contains("\"taxAmount\":\"100.50\""));
        assert!(text.contains("\"quantity\":\"4.5000\""));
        assert!(text.contains("\"taxRate\":\"10.00\""));
        assert!(!text.contains(": "));
    }

    #[test]
    fn created_at_renders_milliseconds_utc() {
        let invoice = sample_invoice();
        let bytes = CanonicalBytes::from_invoice(&invoice, &[]).unwrap();
        let text = std::str::from_utf8(bytes.as_bytes()).unwrap();
        assert!(text.contains("\"createdAt\":\"2026-03-14T09:30:12.345Z\""));
        assert!(text.contains("\"version\":\"1.0\""));
    }

    #[test]
    fn immutable_hash_is_64_hex_chars() {
        let invoice = sample_invoice();
        let hash = CanonicalBytes::from_invoice(&invoice, &sample_lines())
            .unwrap()
            .sha256_hex();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn duplicate_line_numbers_rejected() {
        let invoice = sample_invoice();
        let mut lines = sample_lines();
        lines[0].line_number = 1;
        let err = CanonicalBytes::from_invoice(&invoice, &lines).unwrap_err();
        assert!(matches!(
            err,
            CanonicalizationError::DuplicateLineNumber { line_number: 1, .. }
        ));
    }

    #[test]
    fn foreign_lines_rejected() {
        let invoice = sample_invoice();
        let mut lines = sample_lines();
        lines[1].invoice_id = 99;
        let err = CanonicalBytes::from_invoice(&invoice, &lines).unwrap_err();
        assert!(matches!(err, CanonicalizationError::ForeignLine { .. }));
    }

    #[test]
    fn absent_optionals_serialize_as_null() {
        let invoice = sample_invoice();
        let bytes = CanonicalBytes::from_invoice(&invoice, &[]).unwrap();
        let text = std::str::from_utf8(bytes.as_bytes()).unwrap();
        assert!(text.contains("\"note\":null"));
        assert!(text.contains("\"phone\":null"));
    }
}
