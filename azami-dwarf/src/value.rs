//! 属性値のデコード
//!
//! フォームエントリ1つ分をリーダーからデコードしてタグ付きの値を
//! 作ります。値の判別子はフォームそのものなので、別途タグを保存する
//! 必要はありません。

use crate::abbrev::FormEntry;
use crate::encodings::*;
use crate::errors::DwarfError;
use crate::reader::DwarfReader;
use crate::unit::Unit;
use crate::Result;

/// セクション内のバイト列への参照
///
/// バイト列はコピーしません。`offset`と`length`は値を読んだ
/// セクション（.debug_info）内の位置です。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub offset: u64,
    pub length: u64,
}

/// デコード済みの属性値
///
/// どのバリアントとして読むべきかは、対応するフォームエントリが
/// 決めます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// 符号なし整数（data1..8, udata）
    Udata(u64),
    /// 符号付き整数（sdata, implicit_const）
    Sdata(i64),
    /// アドレスまたはセクションオフセット（addr, ref*, strp, sec_offset等）
    Addr(u64),
    /// 真偽フラグ（flag, flag_present）
    Flag(bool),
    /// 型シグネチャ（ref_sig8）。オフセットではない
    Signature(u64),
    /// 長さ付きバイト列（block*, exprloc）
    Block(Block),
}

impl Value {
    /// フォームエントリ1つ分をデコードし、リーダーを進める
    ///
    /// サポート外のフォームはフォームコードを保持した
    /// `UnsupportedForm`になります。黙った誤デコードは後続オフセット
    /// を全部壊すため許されません。
    pub fn decode(r: &mut DwarfReader<'_>, forment: &FormEntry, unit: &Unit) -> Result<Value> {
        let value = match forment.form {
            DW_FORM_addr => Value::Addr(r.read_uint(unit.address_size as usize)?),

            DW_FORM_data1 => Value::Udata(r.read_u8()? as u64),
            DW_FORM_data2 => Value::Udata(r.read_u16()? as u64),
            DW_FORM_data4 => Value::Udata(r.read_u32()? as u64),
            DW_FORM_data8 => Value::Udata(r.read_uint(8)?),

            DW_FORM_sdata => Value::Sdata(r.read_sleb128()?),
            DW_FORM_udata => Value::Udata(r.read_uleb128()?),

            // 値は略語宣言側が持つ。リーダーは進めない
            DW_FORM_implicit_const => Value::Sdata(forment.value),

            DW_FORM_flag => Value::Flag(r.read_u8()? != 0),
            DW_FORM_flag_present => Value::Flag(true),

            // DWARF 2はstrpを常に4バイトで符号化していた
            DW_FORM_strp => Value::Addr(if unit.version <= 2 {
                r.read_uint(4)?
            } else {
                r.read_uint(unit.offset_size as usize)?
            }),
            DW_FORM_line_strp => Value::Addr(r.read_uint(unit.offset_size as usize)?),
            DW_FORM_GNU_strp_alt => Value::Addr(r.read_uint(unit.offset_size as usize)?),

            // インライン文字列: 開始オフセットだけ記録してNULまで飛ばす
            DW_FORM_string => {
                let start = r.skip_cstr()?;
                Value::Addr(start as u64)
            }

            // 各種インデックス・ユニット相対参照
            DW_FORM_strx | DW_FORM_addrx | DW_FORM_loclistx | DW_FORM_rnglistx
            | DW_FORM_ref_udata => Value::Addr(r.read_uleb128()?),

            DW_FORM_strx1 | DW_FORM_addrx1 | DW_FORM_ref1 => Value::Addr(r.read_u8()? as u64),
            DW_FORM_strx2 | DW_FORM_ref2 => Value::Addr(r.read_u16()? as u64),
            DW_FORM_strx3 | DW_FORM_addrx3 => Value::Addr(r.read_uint(3)?),
            DW_FORM_strx4 | DW_FORM_addrx4 | DW_FORM_ref4 => Value::Addr(r.read_u32()? as u64),
            DW_FORM_ref8 => Value::Addr(r.read_uint(8)?),

            // infoセクション絶対オフセット
            DW_FORM_ref_addr => Value::Addr(r.read_uint(unit.offset_size as usize)?),
            // alternateファイルのinfoへのオフセット
            DW_FORM_GNU_ref_alt => Value::Addr(r.read_uint(unit.offset_size as usize)?),

            DW_FORM_sec_offset => Value::Addr(r.read_uint(unit.offset_size as usize)?),

            DW_FORM_ref_sig8 => Value::Signature(r.read_uint(8)?),

            DW_FORM_block1 => {
                let length = r.read_u8()? as u64;
                Self::decode_block(r, length)?
            }
            DW_FORM_block2 => {
                let length = r.read_u16()? as u64;
                Self::decode_block(r, length)?
            }
            DW_FORM_block4 => {
                let length = r.read_u32()? as u64;
                Self::decode_block(r, length)?
            }
            DW_FORM_block | DW_FORM_exprloc => {
                let length = r.read_uleb128()?;
                Self::decode_block(r, length)?
            }

            form => return Err(DwarfError::UnsupportedForm { form }),
        };
        Ok(value)
    }

    fn decode_block(r: &mut DwarfReader<'_>, length: u64) -> Result<Value> {
        let offset = r.offset() as u64;
        r.skip(length as usize)?;
        Ok(Value::Block(Block { offset, length }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encodings::*;

    fn entry(form: DwForm) -> FormEntry {
        FormEntry {
            attr: DW_AT_name,
            form,
            value: 0,
        }
    }

    fn unit_v4() -> Unit {
        Unit::for_tests(4, 8, 4)
    }

    #[test]
    fn test_decode_addr() {
        let data = [0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut r = DwarfReader::new(&data, 0);
        let v = Value::decode(&mut r, &entry(DW_FORM_addr), &unit_v4()).unwrap();
        assert_eq!(v, Value::Addr(0x400000));
        assert_eq!(r.offset(), 8);
    }

    #[test]
    fn test_decode_strp_v2_is_4_bytes() {
        let unit = Unit::for_tests(2, 8, 8);
        let data = [0x20, 0x00, 0x00, 0x00];
        let mut r = DwarfReader::new(&data, 0);
        let v = Value::decode(&mut r, &entry(DW_FORM_strp), &unit).unwrap();
        assert_eq!(v, Value::Addr(0x20));
        assert_eq!(r.offset(), 4);
    }

    #[test]
    fn test_decode_implicit_const_does_not_advance() {
        let forment = FormEntry {
            attr: DW_AT_const_value,
            form: DW_FORM_implicit_const,
            value: -7,
        };
        let mut r = DwarfReader::new(&[], 0);
        let v = Value::decode(&mut r, &forment, &unit_v4()).unwrap();
        assert_eq!(v, Value::Sdata(-7));
        assert_eq!(r.offset(), 0);
    }

    #[test]
    fn test_decode_block_records_offset_and_skips() {
        // block1: 長さ3 + 中身3バイト
        let data = [0x03, 0xaa, 0xbb, 0xcc, 0xdd];
        let mut r = DwarfReader::new(&data, 0);
        let v = Value::decode(&mut r, &entry(DW_FORM_block1), &unit_v4()).unwrap();
        assert_eq!(
            v,
            Value::Block(Block {
                offset: 1,
                length: 3
            })
        );
        assert_eq!(r.offset(), 4);
    }

    #[test]
    fn test_decode_string_inline() {
        let data = b"abc\0";
        let mut r = DwarfReader::new(data, 0);
        let v = Value::decode(&mut r, &entry(DW_FORM_string), &unit_v4()).unwrap();
        assert_eq!(v, Value::Addr(0));
        assert_eq!(r.offset(), 4);
    }

    #[test]
    fn test_unsupported_form() {
        let mut r = DwarfReader::new(&[0u8; 16], 0);
        match Value::decode(&mut r, &entry(DW_FORM_data16), &unit_v4()) {
            Err(DwarfError::UnsupportedForm { form }) => assert_eq!(form, DW_FORM_data16),
            other => panic!("Expected UnsupportedForm, got {:?}", other),
        }
    }

    #[test]
    fn test_flag_present_reads_nothing() {
        let mut r = DwarfReader::new(&[], 0);
        let v = Value::decode(&mut r, &entry(DW_FORM_flag_present), &unit_v4()).unwrap();
        assert_eq!(v, Value::Flag(true));
    }
}
