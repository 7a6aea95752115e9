//! Lookup tables built from a manifest's `schema` block.

use crate::descriptor::{TypeDescriptor, TypeOp};
use crate::SchemaError;
use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::warn;

/// One declared struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub type_name: String,
    pub required: bool,
    pub wire_key: String,
    pub omit_if_absent: bool,
    pub embedded: bool,
}

/// A declared struct. Zero fields means the struct is opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructSchema {
    fields: Vec<FieldSchema>,
    key_to_field: HashMap<String, usize>,
}

impl StructSchema {
    pub fn is_opaque(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolves a declared name, wire key, or alias to its field.
    pub fn field_for_key(&self, key: &str) -> Option<&FieldSchema> {
        self.key_to_field.get(key).map(|&idx| &self.fields[idx])
    }

    fn build(struct_name: &str, fields: Vec<(FieldSchema, Vec<String>)>) -> Self {
        let mut key_to_field: HashMap<String, usize> = HashMap::new();

        // Declared names and wire keys claim first.
        for (idx, (field, _)) in fields.iter().enumerate() {
            for key in [&field.name, &field.wire_key] {
                match key_to_field.get(key.as_str()) {
                    Some(&owner) if owner != idx => warn!(
                        target: "schema.parse",
                        type_name = struct_name,
                        key = %key,
                        "key claimed by two fields, keeping the first"
                    ),
                    Some(_) => {}
                    None => {
                        key_to_field.insert(key.clone(), idx);
                    }
                }
            }
        }

        let mut alias_claims: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, (_, aliases)) in fields.iter().enumerate() {
            for alias in aliases {
                let claims = alias_claims.entry(alias.as_str()).or_default();
                if !claims.contains(&idx) {
                    claims.push(idx);
                }
            }
        }
        for (alias, claims) in alias_claims {
            if let Some(&owner) = key_to_field.get(alias) {
                if claims != [owner] {
                    warn!(target: "schema.parse", type_name = struct_name, alias, "dropping ambiguous alias");
                }
                continue;
            }
            if let [only] = claims.as_slice() {
                key_to_field.insert(alias.to_string(), *only);
            } else {
                warn!(target: "schema.parse", type_name = struct_name, alias, "dropping ambiguous alias");
            }
        }

        Self {
            fields: fields.into_iter().map(|(field, _)| field).collect(),
            key_to_field,
        }
    }
}

/// Parameter and result types of a function or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<String>,
    pub results: Vec<String>,
    pub doc: Option<String>,
}

/// How a call's results travel on the wire.
///
/// A trailing `error` never carries a value: failures arrive as error
/// envelopes, so only the remaining types shape the result payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultShape {
    /// No value; the wire result must be nil.
    Unit,
    /// One value of the given type.
    Single(String),
    /// A sequence holding one value per type.
    Tuple(Vec<String>),
}

impl Signature {
    pub fn returns_error(&self) -> bool {
        self.results.last().map(String::as_str) == Some("error")
    }

    pub fn result_shape(&self) -> ResultShape {
        let values = if self.returns_error() {
            &self.results[..self.results.len() - 1]
        } else {
            &self.results[..]
        };
        match values {
            [] => ResultShape::Unit,
            [single] => ResultShape::Single(single.clone()),
            many => ResultShape::Tuple(many.to_vec()),
        }
    }

    /// Position of a variadic parameter that is not the last one.
    pub fn misplaced_variadic(&self) -> Option<usize> {
        let last = self.params.len().checked_sub(1)?;
        self.params[..last]
            .iter()
            .position(|p| TypeDescriptor::parse(p).is_variadic())
    }

    pub fn render(&self, receiver: Option<&str>, name: &str) -> String {
        let mut out = String::from("func ");
        if let Some(recv) = receiver {
            out.push_str(&format!("({}) ", recv));
        }
        out.push_str(name);
        out.push('(');
        out.push_str(&self.params.join(", "));
        out.push(')');
        match self.results.as_slice() {
            [] => {}
            [single] => {
                out.push(' ');
                out.push_str(single);
            }
            many => out.push_str(&format!(" ({})", many.join(", "))),
        }
        out
    }
}

/// Concrete instantiations of one generic function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericSchema {
    pub instances: BTreeMap<Vec<String>, String>,
    pub doc: Option<String>,
}

/// Package-level variable; `type_name` has any pointer prefix stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarSchema {
    pub type_name: String,
    pub doc: Option<String>,
}

/// Parsed schema of one artifact.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    structs: BTreeMap<String, BTreeMap<String, StructSchema>>,
    symbols: BTreeMap<String, BTreeMap<String, Signature>>,
    methods: BTreeMap<String, BTreeMap<String, BTreeMap<String, Signature>>>,
    generics: BTreeMap<String, BTreeMap<String, GenericSchema>>,
    vars: BTreeMap<String, BTreeMap<String, VarSchema>>,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    omitempty: bool,
    #[serde(default)]
    embedded: bool,
    #[serde(default)]
    required: Option<bool>,
}

#[derive(Deserialize)]
struct RawSymbol {
    pkg: String,
    name: String,
    params: Vec<String>,
    results: Vec<String>,
    #[serde(default)]
    doc: Option<String>,
}

#[derive(Deserialize)]
struct RawMethod {
    pkg: String,
    recv: String,
    name: String,
    params: Vec<String>,
    results: Vec<String>,
    #[serde(default)]
    doc: Option<String>,
}

#[derive(Deserialize)]
struct RawGeneric {
    pkg: String,
    name: String,
    type_args: Vec<String>,
    symbol: String,
    #[serde(default)]
    doc: Option<String>,
}

#[derive(Deserialize)]
struct RawVar {
    pkg: String,
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    doc: Option<String>,
}

fn clean_doc(doc: Option<String>) -> Option<String> {
    doc.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}

fn entries<'a, T: serde::de::DeserializeOwned>(
    schema: &'a Json,
    section: &'static str,
) -> impl Iterator<Item = T> + 'a {
    schema
        .get(section)
        .and_then(Json::as_array)
        .into_iter()
        .flatten()
        .filter_map(move |entry| match serde_json::from_value::<T>(entry.clone()) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(target: "schema.parse", section, error = %err, "skipping malformed entry");
                None
            }
        })
}

fn parse_field(raw: RawField) -> Option<(FieldSchema, Vec<String>)> {
    if raw.name.is_empty() || raw.type_name.trim().is_empty() {
        return None;
    }
    let wire_key = raw.key.filter(|k| !k.is_empty()).unwrap_or_else(|| raw.name.clone());
    let optional_type = matches!(
        TypeDescriptor::parse(&raw.type_name).peel(),
        Some((TypeOp::Optional, _))
    );
    let mut required = raw.required.unwrap_or(!optional_type && !raw.omitempty);
    if raw.omitempty {
        required = false;
    }
    let aliases = raw.aliases.into_iter().filter(|a| !a.is_empty()).collect();
    Some((
        FieldSchema {
            name: raw.name,
            type_name: raw.type_name.trim().to_string(),
            required,
            wire_key,
            omit_if_absent: raw.omitempty,
            embedded: raw.embedded,
        },
        aliases,
    ))
}

impl Schema {
    /// Builds the lookup tables. A missing block yields an empty schema.
    pub fn from_manifest(block: Option<&Json>) -> Self {
        let mut schema = Schema::default();
        let Some(block) = block else {
            return schema;
        };

        if let Some(by_pkg) = block.get("structs").and_then(Json::as_object) {
            for (pkg, by_name) in by_pkg {
                let Some(by_name) = by_name.as_object() else {
                    warn!(target: "schema.parse", pkg = %pkg, "skipping malformed struct table");
                    continue;
                };
                for (name, raw_fields) in by_name {
                    let Some(raw_fields) = raw_fields.as_array() else {
                        warn!(target: "schema.parse", pkg = %pkg, type_name = %name, "skipping malformed struct");
                        continue;
                    };
                    let fields: Vec<_> = raw_fields
                        .iter()
                        .filter_map(|raw| match serde_json::from_value::<RawField>(raw.clone()) {
                            Ok(field) => parse_field(field),
                            Err(err) => {
                                warn!(target: "schema.parse", type_name = %name, error = %err, "skipping malformed field");
                                None
                            }
                        })
                        .collect();
                    if fields.is_empty() && !raw_fields.is_empty() {
                        warn!(target: "schema.parse", pkg = %pkg, type_name = %name, "struct has no usable fields");
                        continue;
                    }
                    schema
                        .structs
                        .entry(pkg.clone())
                        .or_default()
                        .insert(name.clone(), StructSchema::build(name, fields));
                }
            }
        }

        for raw in entries::<RawSymbol>(block, "symbols") {
            schema.symbols.entry(raw.pkg).or_default().insert(
                raw.name,
                Signature {
                    params: raw.params,
                    results: raw.results,
                    doc: clean_doc(raw.doc),
                },
            );
        }

        for raw in entries::<RawMethod>(block, "methods") {
            schema
                .methods
                .entry(raw.pkg)
                .or_default()
                .entry(raw.recv)
                .or_default()
                .insert(
                    raw.name,
                    Signature {
                        params: raw.params,
                        results: raw.results,
                        doc: clean_doc(raw.doc),
                    },
                );
        }

        for raw in entries::<RawGeneric>(block, "generics") {
            let generic = schema
                .generics
                .entry(raw.pkg)
                .or_default()
                .entry(raw.name)
                .or_default();
            generic.instances.insert(raw.type_args, raw.symbol);
            if let Some(doc) = clean_doc(raw.doc) {
                generic.doc = Some(doc);
            }
        }

        for raw in entries::<RawVar>(block, "vars") {
            let trimmed = raw.type_name.trim();
            let base = trimmed.strip_prefix('*').unwrap_or(trimmed).trim();
            if raw.pkg.is_empty() || raw.name.is_empty() || base.is_empty() {
                warn!(target: "schema.parse", name = %raw.name, "skipping incomplete variable");
                continue;
            }
            schema.vars.entry(raw.pkg).or_default().insert(
                raw.name,
                VarSchema {
                    type_name: base.to_string(),
                    doc: clean_doc(raw.doc),
                },
            );
        }

        schema
    }

    pub fn struct_schema(&self, pkg: &str, name: &str) -> Option<&StructSchema> {
        self.structs.get(pkg)?.get(name)
    }

    pub fn symbol(&self, pkg: &str, name: &str) -> Option<&Signature> {
        self.symbols.get(pkg)?.get(name)
    }

    pub fn method(&self, pkg: &str, receiver: &str, name: &str) -> Option<&Signature> {
        self.methods.get(pkg)?.get(receiver)?.get(name)
    }

    pub fn generic(&self, pkg: &str, name: &str) -> Option<&GenericSchema> {
        self.generics.get(pkg)?.get(name)
    }

    pub fn var(&self, pkg: &str, name: &str) -> Option<&VarSchema> {
        self.vars.get(pkg)?.get(name)
    }

    pub fn require_method(
        &self,
        pkg: &str,
        receiver: &str,
        name: &str,
    ) -> Result<&Signature, SchemaError> {
        self.method(pkg, receiver, name)
            .ok_or_else(|| SchemaError::UnknownMethod {
                package: pkg.to_string(),
                receiver: receiver.to_string(),
                name: name.to_string(),
            })
    }

    /// Concrete symbol for a generic instantiation.
    pub fn generic_symbol<S: AsRef<str>>(
        &self,
        pkg: &str,
        name: &str,
        type_args: &[S],
    ) -> Result<&str, SchemaError> {
        let key: Vec<String> = type_args.iter().map(|a| a.as_ref().trim().to_string()).collect();
        self.generic(pkg, name)
            .and_then(|g| g.instances.get(&key))
            .map(String::as_str)
            .ok_or_else(|| SchemaError::UnknownGeneric {
                package: pkg.to_string(),
                name: name.to_string(),
                type_args: key.join(", "),
            })
    }

    /// Every package named anywhere in the schema, sorted.
    pub fn packages(&self) -> Vec<&str> {
        let mut pkgs: Vec<&str> = self
            .structs
            .keys()
            .chain(self.symbols.keys())
            .chain(self.methods.keys())
            .chain(self.generics.keys())
            .chain(self.vars.keys())
            .map(String::as_str)
            .collect();
        pkgs.sort_unstable();
        pkgs.dedup();
        pkgs
    }

    pub fn structs(&self, pkg: &str) -> impl Iterator<Item = (&str, &StructSchema)> {
        self.structs
            .get(pkg)
            .into_iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn symbols(&self, pkg: &str) -> impl Iterator<Item = (&str, &Signature)> {
        self.symbols
            .get(pkg)
            .into_iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Methods as `(receiver, name, signature)`.
    pub fn methods(&self, pkg: &str) -> impl Iterator<Item = (&str, &str, &Signature)> {
        self.methods.get(pkg).into_iter().flatten().flat_map(|(recv, by_name)| {
            by_name
                .iter()
                .map(move |(name, sig)| (recv.as_str(), name.as_str(), sig))
        })
    }

    pub fn generics(&self, pkg: &str) -> impl Iterator<Item = (&str, &GenericSchema)> {
        self.generics
            .get(pkg)
            .into_iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn vars(&self, pkg: &str) -> impl Iterator<Item = (&str, &VarSchema)> {
        self.vars
            .get(pkg)
            .into_iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Signature line followed by its documentation, if any.
    pub fn describe_symbol(&self, pkg: &str, name: &str) -> Option<String> {
        let sig = self.symbol(pkg, name)?;
        Some(with_doc(sig.render(None, name), sig.doc.as_deref()))
    }

    pub fn describe_method(&self, pkg: &str, receiver: &str, name: &str) -> Option<String> {
        let sig = self.method(pkg, receiver, name)?;
        Some(with_doc(sig.render(Some(receiver), name), sig.doc.as_deref()))
    }

    pub fn describe_generic(&self, pkg: &str, name: &str) -> Option<String> {
        let generic = self.generic(pkg, name)?;
        let mut lines: Vec<String> = generic
            .instances
            .iter()
            .map(|(args, symbol)| format!("{}[{}] -> {}", name, args.join(", "), symbol))
            .collect();
        if let Some(doc) = &generic.doc {
            lines.push(String::new());
            lines.push(doc.clone());
        }
        Some(lines.join("\n"))
    }

    pub fn describe_var(&self, pkg: &str, name: &str) -> Option<String> {
        let var = self.var(pkg, name)?;
        Some(with_doc(
            format!("var {} {}", name, var.type_name),
            var.doc.as_deref(),
        ))
    }
}

fn with_doc(header: String, doc: Option<&str>) -> String {
    match doc {
        Some(doc) => format!("{}\n\n{}", header, doc),
        None => header,
    }
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultShape::Unit => f.write_str("()"),
            ResultShape::Single(t) => f.write_str(t),
            ResultShape::Tuple(ts) => write!(f, "({})", ts.join(", ")),
        }
    }
}
