//! DWARF情報カタログ
//!
//! デバッグセクション一式を所有し、ユニット一覧・ユニット横断の
//! オフセット→DIE解決・文字列テーブル・インデックス式文字列/アドレスの
//! 解決、およびalternateデバッグファイル（GNU DWZ）への参照を提供します。

use std::cell::RefCell;
use std::rc::Rc;

use crate::die::Die;
use crate::encodings::{DW_AT_addr_base, DW_AT_str_offsets_base};
use crate::errors::DwarfError;
use crate::reader::DwarfReader;
use crate::unit::Unit;
use crate::Result;

/// DWARFデバッグセクション一式
///
/// 無いセクションは空のままでよい。テストではELFを介さず
/// 直接構築できます。
#[derive(Debug, Default, Clone)]
pub struct Sections {
    pub debug_info: Vec<u8>,
    pub debug_abbrev: Vec<u8>,
    pub debug_str: Vec<u8>,
    pub debug_line_str: Vec<u8>,
    pub debug_str_offsets: Vec<u8>,
    pub debug_addr: Vec<u8>,
    pub debug_ranges: Vec<u8>,
    pub debug_rnglists: Vec<u8>,
}

/// 情報カタログ
///
/// 1つのデバッグ対象（実行ファイルまたはalternateファイル）に対応し、
/// ユニット群とセクションリーダーの寿命の根になります。
#[derive(Debug)]
pub struct Info {
    sections: Sections,
    units: RefCell<Option<Vec<Rc<Unit>>>>,
    alt: RefCell<Option<Rc<Info>>>,
}

impl Info {
    /// セクション一式からカタログを作る
    pub fn new(sections: Sections) -> Rc<Info> {
        Rc::new(Info {
            sections,
            units: RefCell::new(None),
            alt: RefCell::new(None),
        })
    }

    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    /// 全ユニットを返す。初回呼び出しでヘッダをパースしてキャッシュする
    pub fn units(self: &Rc<Self>) -> Result<Vec<Rc<Unit>>> {
        if let Some(units) = self.units.borrow().as_ref() {
            return Ok(units.clone());
        }

        let mut units = Vec::new();
        let section_len = self.sections.debug_info.len() as u64;
        let mut offset = 0u64;
        while offset < section_len {
            let unit = Rc::new(Unit::parse(
                &self.sections.debug_info,
                &self.sections.debug_abbrev,
                offset,
            )?);
            if unit.end <= offset {
                return Err(DwarfError::InvariantViolated("unit length does not advance"));
            }
            offset = unit.end;
            units.push(unit);
        }

        *self.units.borrow_mut() = Some(units.clone());
        Ok(units)
    }

    /// infoセクション絶対オフセットを含むユニットを探す
    pub fn unit_for_offset(self: &Rc<Self>, offset: u64) -> Result<Option<Rc<Unit>>> {
        Ok(self
            .units()?
            .into_iter()
            .find(|unit| unit.contains_offset(offset)))
    }

    /// infoセクション絶対オフセットのDIEを解決する（ユニット横断）
    pub fn offset_to_die(self: &Rc<Self>, offset: u64) -> Result<Option<Die>> {
        match self.unit_for_offset(offset)? {
            Some(unit) => unit.offset_to_die(self, None, offset),
            None => Ok(None),
        }
    }

    /// .debug_strの指定オフセットの文字列
    pub fn string_at(&self, offset: u64) -> Result<String> {
        DwarfReader::new(&self.sections.debug_str, offset as usize).read_string()
    }

    /// .debug_line_strの指定オフセットの文字列
    pub fn line_string_at(&self, offset: u64) -> Result<String> {
        DwarfReader::new(&self.sections.debug_line_str, offset as usize).read_string()
    }

    /// .debug_info内のインライン文字列（DW_FORM_string）
    pub(crate) fn info_string_at(&self, offset: u64) -> Result<String> {
        DwarfReader::new(&self.sections.debug_info, offset as usize).read_string()
    }

    /// インデックス式文字列（strx*）を解決する
    ///
    /// ルートDIEのDW_AT_str_offsets_base（無ければ0）を基点に
    /// .debug_str_offsetsのエントリを引き、.debug_strから読む。
    pub fn strx(self: &Rc<Self>, unit: &Rc<Unit>, index: u64) -> Result<String> {
        let root = unit.root(self)?;
        let base = match root.attribute(DW_AT_str_offsets_base, false)? {
            Some(attr) => attr.as_udata()?,
            None => 0,
        };
        let offset_size = unit.offset_size as u64;
        let mut r = DwarfReader::new(
            &self.sections.debug_str_offsets,
            (base + index * offset_size) as usize,
        );
        let str_offset = r.read_uint(unit.offset_size as usize)?;
        self.string_at(str_offset)
    }

    /// インデックス式アドレス（addrx*、rnglistsのstartx系）を解決する
    pub fn addrx(self: &Rc<Self>, unit: &Rc<Unit>, index: u64) -> Result<u64> {
        let root = unit.root(self)?;
        let base = match root.attribute(DW_AT_addr_base, false)? {
            Some(attr) => attr.as_udata()?,
            None => 0,
        };
        let address_size = unit.address_size as u64;
        let mut r = DwarfReader::new(
            &self.sections.debug_addr,
            (base + index * address_size) as usize,
        );
        r.read_uint(unit.address_size as usize)
    }

    /// alternateデバッグファイル（GNU DWZ）のカタログ
    pub fn alt(&self) -> Option<Rc<Info>> {
        self.alt.borrow().clone()
    }

    /// alternateデバッグファイルを設定する
    pub fn set_alt(&self, alt: Rc<Info>) {
        *self.alt.borrow_mut() = Some(alt);
    }
}
