//! レンジリストの解決
//!
//! DW_AT_rangesをアドレス区間列へ具体化します。DWARF 4以前は
//! .debug_ranges（アドレス幅のペア列、(0,0)終端）、DWARF 5は
//! .debug_rnglists（タグ付きエントリ列）。結果はユニット単位で
//! 属性値をキーにメモ化されます。

use std::rc::Rc;

use crate::die::Die;
use crate::encodings::*;
use crate::errors::DwarfError;
use crate::info::Info;
use crate::reader::DwarfReader;
use crate::unit::Unit;
use crate::Result;

/// `(開始, 終端)`アドレスペアの列。区間は半開`[start, end)`
pub type Ranges = Vec<(u64, u64)>;

/// 属性値をレンジ列へ解決する。キャッシュヒットなら同じ列を返す
pub(crate) fn resolve(die: &Die, key: u64) -> Result<Rc<Ranges>> {
    if let Some(cached) = die.unit().cached_ranges(key) {
        return Ok(cached);
    }
    let ranges = if die.unit().version < 5 {
        decode_debug_ranges(die, key)?
    } else {
        decode_rnglists(die, key)?
    };
    Ok(die.unit().cache_ranges(key, ranges))
}

/// DWARF 4以前: .debug_rangesのペア列
fn decode_debug_ranges(die: &Die, offset: u64) -> Result<Ranges> {
    let address_size = die.unit().address_size as usize;
    let sections = die.info().sections();
    let mut r = DwarfReader::new(&sections.debug_ranges, offset as usize);
    let mut ranges = Ranges::new();
    loop {
        let start = r.read_uint(address_size)?;
        let end = r.read_uint(address_size)?;
        if start == 0 && end == 0 {
            break;
        }
        ranges.push((start, end));
    }
    Ok(ranges)
}

/// DWARF 5: .debug_rnglistsのタグ付きエントリ列
fn decode_rnglists(die: &Die, attr_value: u64) -> Result<Ranges> {
    let unit = die.unit().clone();
    let info = die.info().clone();

    // 開始オフセットはルートDIEのrnglists_baseで偏移する
    let mut offset = attr_value;
    let root = unit.root(&info)?;
    if let Some(base_attr) = root.attribute(DW_AT_rnglists_base, false)? {
        offset += base_attr.as_udata()?;
    }

    let address_size = unit.address_size as usize;
    let sections = info.sections();
    let mut r = DwarfReader::new(&sections.debug_rnglists, offset as usize);
    let mut ranges = Ranges::new();
    let mut base = 0u64;
    loop {
        let kind = DwRle(r.read_u8()?);
        match kind {
            DW_RLE_end_of_list => break,
            DW_RLE_base_address => {
                base = r.read_uint(address_size)?;
            }
            DW_RLE_offset_pair => {
                let start = r.read_uleb128()?;
                let end = r.read_uleb128()?;
                ranges.push((base + start, base + end));
            }
            DW_RLE_start_end => {
                let start = r.read_uint(address_size)?;
                let end = r.read_uint(address_size)?;
                ranges.push((start, end));
            }
            DW_RLE_start_length => {
                let start = r.read_uint(address_size)?;
                let length = r.read_uleb128()?;
                ranges.push((start, start + length));
            }
            DW_RLE_base_addressx => {
                let index = r.read_uleb128()?;
                base = indexed_address(&info, &unit, kind, index)?;
            }
            DW_RLE_startx_endx => {
                let start = r.read_uleb128()?;
                let end = r.read_uleb128()?;
                ranges.push((
                    indexed_address(&info, &unit, kind, start)?,
                    indexed_address(&info, &unit, kind, end)?,
                ));
            }
            DW_RLE_startx_length => {
                let start = r.read_uleb128()?;
                let length = r.read_uleb128()?;
                let start = indexed_address(&info, &unit, kind, start)?;
                ranges.push((start, start + length));
            }
            kind => return Err(DwarfError::RangeListMalformed { kind }),
        }
    }
    Ok(ranges)
}

/// startx系エントリのインデックスを.debug_addrで引く
///
/// アドレステーブルが無いまま黙って成功してはいけない。
fn indexed_address(info: &Rc<Info>, unit: &Rc<Unit>, kind: DwRle, index: u64) -> Result<u64> {
    if info.sections().debug_addr.is_empty() {
        return Err(DwarfError::UnsupportedRngList { kind });
    }
    info.addrx(unit, index)
}
