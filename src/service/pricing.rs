use bigdecimal::{BigDecimal, Zero};
use std::str::FromStr;

use crate::models::{is_buy_back_scheme, EditedField, PricingFields};

/// 推导出的利率保留的小数位, 消除除法尾差
const RATE_SCALE: i64 = 8;

/// 回购定价联动: 进价 / 利率 / 回购价
///
/// 一次编辑调用一次 reconcile, 由调用方告知修改的是哪个字段,
/// 不存在两个字段互相监听造成的反复计算.
pub struct PricingReconciler;

impl PricingReconciler {
    /// price = p + p * rate / 100
    ///
    /// 进价为 0 时不推导, 返回 None.
    pub fn derive_from_rate(purchase_price: &BigDecimal, rate: &BigDecimal) -> Option<BigDecimal> {
        if purchase_price.is_zero() {
            return None;
        }
        let hundred = BigDecimal::from(100);
        Some(purchase_price + purchase_price * rate / hundred)
    }

    /// rate = (price - p) / p * 100
    ///
    /// 进价为 0 时不推导, 返回 None.
    pub fn derive_from_price(purchase_price: &BigDecimal, price: &BigDecimal) -> Option<BigDecimal> {
        if purchase_price.is_zero() {
            return None;
        }
        let rate = (price - purchase_price) / purchase_price * BigDecimal::from(100);
        Some(round_half_up(&rate, RATE_SCALE).normalized())
    }

    /// 根据被编辑的字段重新计算从属字段
    ///
    /// - 改利率或进价: 由利率重算回购价
    /// - 改回购价: 由回购价重算利率, 结果与当前利率相同时不回写
    ///
    /// 进价缺失或为 0 时原样返回. 驱动字段无法解析 (None) 时从属字段也置为 None.
    pub fn reconcile(edited: EditedField, fields: &PricingFields) -> PricingFields {
        let mut next = fields.clone();

        let Some(purchase_price) = fields.purchase_price.as_ref().filter(|p| !p.is_zero()) else {
            tracing::debug!("purchase price missing or zero, skipping derivation");
            return next;
        };

        match edited {
            EditedField::Rate | EditedField::PurchasePrice => {
                next.scheme_price = match &fields.scheme_rate {
                    Some(rate) => Self::derive_from_rate(purchase_price, rate),
                    // 改进价时利率为空: 保留回购价
                    None if edited == EditedField::PurchasePrice => fields.scheme_price.clone(),
                    None => None,
                };
            }
            EditedField::Price => match &fields.scheme_price {
                Some(price) => {
                    let rate = Self::derive_from_price(purchase_price, price);
                    if rate != fields.scheme_rate {
                        next.scheme_rate = rate;
                    }
                }
                None => next.scheme_rate = None,
            },
        }

        next
    }

    /// 仅对回购方案联动, 其他方案原样保存
    pub fn apply_for_scheme(scheme: &str, edited: EditedField, fields: &PricingFields) -> PricingFields {
        if is_buy_back_scheme(scheme) {
            Self::reconcile(edited, fields)
        } else {
            fields.clone()
        }
    }
}

/// 四舍五入到 scale 位小数 (远离零方向)
fn round_half_up(value: &BigDecimal, scale: i64) -> BigDecimal {
    let half = BigDecimal::from(5) / BigDecimal::from(10i64.pow(scale as u32 + 1));
    let shifted = if *value < BigDecimal::zero() { value - half } else { value + half };
    // with_scale 向零截断
    shifted.with_scale(scale)
}

/// 解析用户输入的金额/百分比, 允许逗号作为小数点
pub fn parse_amount(text: &str) -> Option<BigDecimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    BigDecimal::from_str(&trimmed.replace(',', ".")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn fields(p: Option<&str>, rate: Option<&str>, price: Option<&str>) -> PricingFields {
        PricingFields {
            purchase_price: p.map(dec),
            scheme_rate: rate.map(dec),
            scheme_price: price.map(dec),
        }
    }

    #[test]
    fn rate_edit_derives_price() {
        let out = PricingReconciler::reconcile(
            EditedField::Rate,
            &fields(Some("100"), Some("10"), None),
        );
        assert_eq!(out.scheme_price, Some(dec("110")));
        assert_eq!(out.scheme_rate, Some(dec("10")));
    }

    #[test]
    fn price_edit_derives_rate() {
        let out = PricingReconciler::reconcile(
            EditedField::Price,
            &fields(Some("100"), Some("10"), Some("120")),
        );
        assert_eq!(out.scheme_rate, Some(dec("20")));
        assert_eq!(out.scheme_price, Some(dec("120")));
    }

    #[test]
    fn purchase_price_edit_keeps_rate() {
        let out = PricingReconciler::reconcile(
            EditedField::PurchasePrice,
            &fields(Some("250"), Some("12"), Some("112")),
        );
        assert_eq!(out.scheme_rate, Some(dec("12")));
        assert_eq!(out.scheme_price, Some(dec("280")));
    }

    #[test]
    fn purchase_price_edit_without_rate_keeps_price() {
        let before = fields(Some("80"), None, Some("90"));
        let out = PricingReconciler::reconcile(EditedField::PurchasePrice, &before);
        assert_eq!(out, before);
    }

    #[test]
    fn zero_purchase_price_is_a_no_op() {
        let before = fields(Some("0"), Some("15"), Some("42"));
        assert_eq!(PricingReconciler::reconcile(EditedField::Rate, &before), before);
        assert_eq!(PricingReconciler::reconcile(EditedField::Price, &before), before);
        assert_eq!(PricingReconciler::derive_from_rate(&dec("0"), &dec("15")), None);
        assert_eq!(PricingReconciler::derive_from_price(&dec("0.00"), &dec("42")), None);
    }

    #[test]
    fn missing_purchase_price_is_a_no_op() {
        let before = fields(None, Some("15"), None);
        assert_eq!(PricingReconciler::reconcile(EditedField::Rate, &before), before);
    }

    #[test]
    fn unparseable_driver_invalidates_dependent() {
        let out = PricingReconciler::reconcile(
            EditedField::Rate,
            &fields(Some("100"), None, Some("110")),
        );
        assert_eq!(out.scheme_price, None);

        let out = PricingReconciler::reconcile(
            EditedField::Price,
            &fields(Some("100"), Some("10"), None),
        );
        assert_eq!(out.scheme_rate, None);
    }

    #[test]
    fn price_edit_with_same_rate_leaves_rate_untouched() {
        // 10.000 与 10 数值相等, 不回写, 保留用户输入的形式
        let before = fields(Some("100"), Some("10.000"), Some("110"));
        let out = PricingReconciler::reconcile(EditedField::Price, &before);
        assert_eq!(out.scheme_rate.map(|r| r.to_string()), Some("10.000".to_string()));
    }

    #[test]
    fn negative_rate_below_purchase_price() {
        let out = PricingReconciler::reconcile(
            EditedField::Price,
            &fields(Some("200"), None, Some("150")),
        );
        assert_eq!(out.scheme_rate, Some(dec("-25")));
    }

    #[test]
    fn rate_price_round_trip() {
        let cases = [
            ("100", "10"),
            ("3", "1.2345"),
            ("59.99", "7.5"),
            ("1234.56", "-12.5"),
            ("0.01", "300"),
        ];
        for (p, r) in cases {
            let price = PricingReconciler::derive_from_rate(&dec(p), &dec(r)).unwrap();
            let back = PricingReconciler::derive_from_price(&dec(p), &price).unwrap();
            assert_eq!(back, dec(r), "purchase {p} rate {r}");
        }
    }

    #[test]
    fn non_buy_back_scheme_is_stored_as_typed() {
        let before = fields(Some("100"), Some("10"), Some("999"));
        let out = PricingReconciler::apply_for_scheme("sale", EditedField::Rate, &before);
        assert_eq!(out, before);

        let out = PricingReconciler::apply_for_scheme("28-day-buy-back", EditedField::Rate, &before);
        assert_eq!(out.scheme_price, Some(dec("110")));
    }

    #[test]
    fn repeating_rate_is_rounded() {
        let rate = PricingReconciler::derive_from_price(&dec("3"), &dec("5")).unwrap();
        assert_eq!(rate, dec("66.66666667"));
        let rate = PricingReconciler::derive_from_price(&dec("3"), &dec("1")).unwrap();
        assert_eq!(rate, dec("-66.66666667"));
    }

    #[test]
    fn parse_amount_handles_commas_and_blanks() {
        assert_eq!(parse_amount(" 12,50 "), Some(dec("12.5")));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("   "), None);
    }
}
