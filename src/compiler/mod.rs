//! Code assembly: preamble, input bindings, user code and result trailer.

use indexmap::IndexMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::codec::{encode_literal, ruby_string_literal};
use crate::error::{ExecError, Result};
use crate::flavour::Flavour;

pub const RESULT_BEGIN: &str = "%%%RRUN-RESULT-BEGIN%%%";
pub const RESULT_END: &str = "%%%RRUN-RESULT-END%%%";

const ASSEMBLER_ID: &str = "remote_run::ExecutionContext";
const RESULT_VAR: &str = "__rrun_result__";

/// Identity of everything besides the code that decides what a run means.
#[derive(Debug, Clone)]
pub struct HashContext {
    pub adapter_kind: String,
    /// Canonical form of the adapter's non-secret parameters.
    pub params: String,
}

/// A fully assembled, self-contained program plus its cache key.
#[derive(Debug, Clone)]
pub struct ExecutionUnit {
    source: String,
    locals: IndexMap<String, Value>,
    code: String,
    hash: String,
}

impl ExecutionUnit {
    /// Wrap program text that was assembled elsewhere. The text must follow
    /// the result protocol on its own; it carries no input bindings.
    pub fn from_assembled(code: impl Into<String>, ctx: &HashContext) -> Self {
        let code = code.into();
        let hash = content_hash(ctx, &code);
        Self {
            source: code.clone(),
            locals: IndexMap::new(),
            code,
            hash,
        }
    }

    /// The raw user code, as given.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Input bindings sent with the unit.
    pub fn locals(&self) -> &IndexMap<String, Value> {
        &self.locals
    }

    /// The assembled program text written to the environment.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

pub fn assemble(
    source: &str,
    locals: &IndexMap<String, Value>,
    flavours: &[Flavour],
    ctx: &HashContext,
) -> Result<ExecutionUnit> {
    for name in locals.keys() {
        if !is_local_name(name) {
            return Err(ExecError::InvalidBinding(name.clone()));
        }
    }

    let mut code = String::new();
    code.push_str("require 'json'\n");
    for flavour in flavours {
        code.push_str(&flavour.code_header());
    }
    for (name, value) in locals {
        code.push_str(&format!(
            "{} = JSON.parse({}.unpack1('m0').force_encoding('UTF-8'))[0]\n",
            name,
            ruby_string_literal(&encode_literal(value))
        ));
    }
    code.push_str(&format!("{} = begin\n", RESULT_VAR));
    code.push_str(source);
    if !source.ends_with('\n') {
        code.push('\n');
    }
    code.push_str("end\n");
    code.push_str(&trailer(locals));

    let hash = content_hash(ctx, &code);
    tracing::debug!(
        hash = %hash,
        bytes = code.len(),
        flavours = ?flavours.iter().map(Flavour::name).collect::<Vec<_>>(),
        "assembled unit"
    );

    Ok(ExecutionUnit {
        source: source.to_string(),
        locals: locals.clone(),
        code,
        hash,
    })
}

fn trailer(locals: &IndexMap<String, Value>) -> String {
    let pairs = locals
        .keys()
        .map(|name| format!("{} => {}", ruby_string_literal(name), name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "$stdout.flush\n\
         $stdout.write(\"\\n\" + {begin} + [JSON.generate({{ 'result' => {var}, 'locals' => {{ {pairs} }} }})].pack('m0') + {end} + \"\\n\")\n\
         $stdout.flush\n",
        begin = ruby_string_literal(RESULT_BEGIN),
        end = ruby_string_literal(RESULT_END),
        var = RESULT_VAR,
        pairs = pairs,
    )
}

fn content_hash(ctx: &HashContext, code: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [ASSEMBLER_ID, ctx.adapter_kind.as_str(), ctx.params.as_str(), code] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

const RESERVED: &[&str] = &[
    "alias", "and", "begin", "break", "case", "class", "def", "defined", "do", "else", "elsif",
    "end", "ensure", "false", "for", "if", "in", "module", "next", "nil", "not", "or", "redo",
    "rescue", "retry", "return", "self", "super", "then", "true", "undef", "unless", "until",
    "when", "while", "yield",
];

fn is_local_name(name: &str) -> bool {
    if RESERVED.contains(&name) || name == RESULT_VAR {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
