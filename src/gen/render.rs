//! Renders the five compiled-database outputs as Rust source text, the way
//! the real generator emits `insnsb.c`/`insnsa.c`/`insnsd.c`/`insnsi.h`/
//! `insnsn.c` as checked-in generated source rather than a binary blob.

use super::CompiledDatabase;
use crate::disasm::Cell;

/// `insnsb`: the interned bytecode pool, as one flat byte array.
pub fn render_insnsb(db: &CompiledDatabase) -> String {
    let mut out = String::new();
    out.push_str("// Generated bytecode pool.\n");
    out.push_str("pub static BYTECODE: &[u8] = &[\n");
    for chunk in db.pool.bytes.chunks(16) {
        out.push_str("    ");
        for b in chunk {
            out.push_str(&format!("0o{b:03o}, "));
        }
        out.push('\n');
    }
    out.push_str("];\n");
    out
}

/// `insnsa`: one row per compiled template — mnemonic id, operand roles,
/// flags bits and the pool offset its bytecode starts at.
pub fn render_insnsa(db: &CompiledDatabase) -> String {
    let mut out = String::new();
    out.push_str("// Generated per-mnemonic template table.\n");
    out.push_str("pub struct InsnTemplate { pub mnemonic: u32, pub operands: &'static [&'static str], pub flags: u32, pub pool_offset: usize }\n\n");
    out.push_str("pub static TEMPLATES: &[InsnTemplate] = &[\n");
    for t in &db.templates {
        let id = db.mnemonics.id_of(&t.mnemonic).unwrap_or(u32::MAX);
        let ops: Vec<String> = t.operands.iter().map(|o| format!("{o:?}")).collect();
        out.push_str(&format!(
            "    InsnTemplate {{ mnemonic: {id}, operands: &[{}], flags: {:#x}, pool_offset: {} }},\n",
            ops.join(", "),
            t.flags.bits(),
            t.pool_offset,
        ));
    }
    out.push_str("];\n");
    out
}

/// `insnsd`: the disassembly dispatch tree, rendered as a sparse
/// byte-to-template map per legacy map.
pub fn render_insnsd(db: &CompiledDatabase) -> String {
    let mut out = String::new();
    out.push_str("// Generated disassembly dispatch tree.\n");
    out.push_str("pub static MAP0: &[(u8, &[usize])] = &[\n");
    render_table(&db.disasm.map0, &mut out);
    out.push_str("];\n\n");

    let mut maps: Vec<_> = db.disasm.legacy_maps.keys().copied().collect();
    maps.sort();
    for map in maps {
        out.push_str(&format!("pub static MAP{map}: &[(u8, &[usize])] = &[\n"));
        render_table(&db.disasm.legacy_maps[&map], &mut out);
        out.push_str("];\n\n");
    }
    out
}

fn render_table(table: &[Cell; 256], out: &mut String) {
    for (byte, cell) in table.iter().enumerate() {
        if let Cell::Templates(templates) = cell {
            let indices: Vec<String> = templates.iter().map(|t| t.index.to_string()).collect();
            out.push_str(&format!("    (0x{byte:02x}, &[{}]),\n", indices.join(", ")));
        }
    }
}

/// `insnsi`: the mnemonic enumeration.
pub fn render_insnsi(db: &CompiledDatabase) -> String {
    let mut out = String::new();
    out.push_str("// Generated mnemonic enumeration.\n");
    out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq)]\n");
    out.push_str("pub enum Mnemonic {\n");
    for name in db.mnemonics.names() {
        out.push_str(&format!("    {},\n", to_enum_variant(name)));
    }
    out.push_str("}\n");
    out
}

/// `insnsn`: the mnemonic name table, indexed by `Mnemonic as usize`.
pub fn render_insnsn(db: &CompiledDatabase) -> String {
    let mut out = String::new();
    out.push_str("// Generated mnemonic name table.\n");
    out.push_str("pub static MNEMONIC_NAMES: &[&str] = &[\n");
    for name in db.mnemonics.names() {
        out.push_str(&format!("    {name:?},\n"));
    }
    out.push_str("];\n");
    out
}

fn to_enum_variant(mnemonic: &str) -> String {
    let mut out = String::new();
    let mut cap_next = true;
    for c in mnemonic.chars() {
        if c == '_' {
            cap_next = true;
            continue;
        }
        if cap_next {
            out.extend(c.to_uppercase());
            cap_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::compile_database;

    #[test]
    fn renders_all_five_outputs_without_panicking() {
        let text = "mov rmr, rmr [mr: 89 /r] X64\n";
        let db = compile_database(text).unwrap();
        assert!(render_insnsb(&db).contains("BYTECODE"));
        assert!(render_insnsa(&db).contains("InsnTemplate"));
        assert!(render_insnsd(&db).contains("MAP0"));
        assert!(render_insnsi(&db).contains("Mov"));
        assert!(render_insnsn(&db).contains("\"mov\""));
    }
}
