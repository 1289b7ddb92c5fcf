//! Read-only exports of the metadata graph
//!
//! A declaration listing, a C header with pseudo-struct layouts, and a JSON
//! snapshot. None of them touch the runtime.

use crate::metadata::{Class, Field, Method};
use crate::resolver::UnityResolve;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::info;

fn signed_hex(value: i64, digits: usize) -> String {
    let sign = if value < 0 { '-' } else { '+' };
    format!("{}0x{:0width$X}", sign, value.unsigned_abs(), width = digits)
}

/// C identifier for a managed name (`<Foo>k__BackingField` -> `_Foo_k__BackingField`)
fn identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

fn write_method<W: Write>(resolve: &UnityResolve, out: &mut W, method: &Method) -> io::Result<()> {
    let rva = match resolve.method_rva(method) {
        Some(rva) => signed_hex(rva as i64, 8),
        None => "?".to_string(),
    };
    writeln!(
        out,
        "\t\t[Flags: {:032b}] [ParamsCount: {:04}] |RVA: {}|",
        method.flags,
        method.args.len(),
        rva
    )?;

    let params: Vec<String> = method
        .args
        .iter()
        .map(|arg| format!("{} {}", arg.ty.name, arg.name))
        .collect();
    writeln!(
        out,
        "\t\t{}{} {}({});",
        if method.is_static() { "static " } else { "" },
        method.return_type.name,
        method.name,
        params.join(", ")
    )
}

/// Every assembly, class, field and method as a declaration listing
pub fn write_declarations<W: Write>(resolve: &UnityResolve, out: &mut W) -> io::Result<()> {
    writeln!(out, "/*\n * {} metadata\n */", resolve.mode())?;

    for assembly in resolve.assemblies() {
        writeln!(out, "Assembly: {}", assembly.name)?;
        writeln!(out, "AssemblyFile: {}", assembly.file)?;
        writeln!(out, "{{\n")?;

        for class in &assembly.classes {
            writeln!(out, "\tnamespace: {}", class.namespace)?;
            match &class.parent {
                Some(parent) => writeln!(out, "\tclass {} : {} {{\n", class.name, parent)?,
                None => writeln!(out, "\tclass {} {{\n", class.name)?,
            }

            for field in &class.fields {
                writeln!(
                    out,
                    "\t\t{} | {}{} {}",
                    signed_hex(field.offset as i64, 4),
                    if field.static_field { "static " } else { "" },
                    field.ty.name,
                    field.name
                )?;
            }
            writeln!(out)?;

            for method in &class.methods {
                write_method(resolve, out, method)?;
            }
            writeln!(out, "\t}}\n")?;
        }
        writeln!(out, "}}\n")?;
    }
    Ok(())
}

fn field_size(field: &Field) -> Option<usize> {
    field
        .ty
        .code
        .size()
        .or_else(|| field.ty.size.filter(|size| *size > 0).map(|size| size as usize))
}

fn write_struct<W: Write>(out: &mut W, class: &Class) -> io::Result<()> {
    let mut fields: Vec<&Field> = class.fields.iter().filter(|f| !f.static_field).collect();
    fields.sort_by_key(|f| f.offset);

    match &class.parent {
        Some(parent) => writeln!(out, "// {} : {}", class.full_name(), parent)?,
        None => writeln!(out, "// {}", class.full_name())?,
    }
    writeln!(out, "struct {} {{", identifier(&class.full_name()))?;

    let mut cursor = 0usize;
    for (i, field) in fields.iter().enumerate() {
        let offset = field.offset.max(0) as usize;
        if offset < cursor {
            writeln!(
                out,
                "    // {} {} overlaps at 0x{:X}",
                field.ty.name, field.name, offset
            )?;
            continue;
        }
        if offset > cursor {
            writeln!(out, "    uint8_t pad_{:X}[0x{:X}];", cursor, offset - cursor)?;
        }

        let next = fields.get(i + 1).map(|f| f.offset.max(0) as usize);
        let size = field_size(field).or_else(|| next.map(|next| next.saturating_sub(offset)));
        let name = identifier(&field.name);
        match size {
            Some(size) if field.ty.code.size() == Some(size) => {
                writeln!(
                    out,
                    "    {} {}; // 0x{:X} {}",
                    field.ty.code.c_type(),
                    name,
                    offset,
                    field.ty.name
                )?;
                cursor = offset + size;
            }
            Some(size) if size > 0 => {
                writeln!(
                    out,
                    "    uint8_t {}[0x{:X}]; // 0x{:X} {}",
                    name, size, offset, field.ty.name
                )?;
                cursor = offset + size;
            }
            // covered by the padding before the next field
            _ => writeln!(
                out,
                "    // {} {} at 0x{:X}, size unknown",
                field.ty.name, field.name, offset
            )?,
        }
    }

    for field in class.fields.iter().filter(|f| f.static_field) {
        writeln!(out, "    // static {} {}", field.ty.name, field.name)?;
    }
    writeln!(out, "}};\n")
}

/// Pseudo-struct layouts for every class. Offsets include the object header.
pub fn write_header<W: Write>(resolve: &UnityResolve, out: &mut W) -> io::Result<()> {
    writeln!(out, "// {} object layouts", resolve.mode())?;
    writeln!(out, "#pragma once\n#include <stdint.h>\n")?;

    for assembly in resolve.assemblies() {
        if assembly.classes.is_empty() {
            continue;
        }
        writeln!(out, "// {}\n", assembly.name)?;
        for class in &assembly.classes {
            write_struct(out, class)?;
        }
    }
    Ok(())
}

fn write_file(
    path: impl AsRef<Path>,
    write: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>,
) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path.as_ref())?);
    write(&mut out)?;
    out.flush()?;
    info!("wrote {}", path.as_ref().display());
    Ok(())
}

/// [`write_declarations`] into a file
pub fn dump_declarations(resolve: &UnityResolve, path: impl AsRef<Path>) -> io::Result<()> {
    write_file(path, |out| write_declarations(resolve, out))
}

/// [`write_header`] into a file
pub fn dump_header(resolve: &UnityResolve, path: impl AsRef<Path>) -> io::Result<()> {
    write_file(path, |out| write_header(resolve, out))
}

/// Snapshot of the whole graph
pub fn to_json(resolve: &UnityResolve) -> serde_json::Result<Value> {
    Ok(json!({
        "mode": resolve.mode().to_string(),
        "stats": {
            "assemblies": resolve.stats().assemblies,
            "classes": resolve.stats().classes,
            "fields": resolve.stats().fields,
            "methods": resolve.stats().methods,
            "skipped": resolve.stats().skipped,
        },
        "assemblies": serde_json::to_value(resolve.assemblies())?,
    }))
}
