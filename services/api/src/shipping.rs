//! Shipping fees by delivery region

use serde::Serialize;

use crate::slug::fold_diacritics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRate {
    pub region: &'static str,
    pub base_fee: i64,
    pub free_shipping_threshold: i64,
}

const DEFAULT_RATE: ShippingRate = ShippingRate {
    region: "default",
    base_fee: 40_000,
    free_shipping_threshold: 1_000_000,
};

pub const SHIPPING_RATES: [ShippingRate; 5] = [
    ShippingRate {
        region: "hcm",
        base_fee: 0,
        free_shipping_threshold: 0,
    },
    ShippingRate {
        region: "hanoi",
        base_fee: 20_000,
        free_shipping_threshold: 500_000,
    },
    ShippingRate {
        region: "mien_nam",
        base_fee: 25_000,
        free_shipping_threshold: 500_000,
    },
    ShippingRate {
        region: "mien_trung",
        base_fee: 35_000,
        free_shipping_threshold: 800_000,
    },
    ShippingRate {
        region: "mien_bac",
        base_fee: 30_000,
        free_shipping_threshold: 500_000,
    },
];

// Checked in order; the first region with a matching keyword wins.
const REGION_KEYWORDS: [(&str, &[&str]); 5] = [
    (
        "hcm",
        &[
            "hồ chí minh", "hcm", "sài gòn", "saigon", "tp.hcm", "tphcm", "quận 1", "quận 2",
            "quận 3", "quận 4", "quận 5", "quận 6", "quận 7", "quận 8", "quận 9", "quận 10",
            "quận 11", "quận 12", "bình thạnh", "gò vấp", "tân bình", "tân phú", "phú nhuận",
            "thủ đức", "bình tân", "củ chi", "hóc môn", "nhà bè", "cần giờ",
        ],
    ),
    (
        "hanoi",
        &[
            "hà nội", "hanoi", "hoàn kiếm", "ba đình", "đống đa", "hai bà trưng", "hoàng mai",
            "thanh xuân", "cầu giấy", "long biên", "tây hồ", "nam từ liêm", "bắc từ liêm",
            "hà đông",
        ],
    ),
    (
        "mien_nam",
        &[
            "bình dương", "đồng nai", "long an", "tây ninh", "bà rịa", "vũng tàu", "bình phước",
            "cần thơ", "an giang", "kiên giang", "cà mau", "bạc liêu", "sóc trăng", "trà vinh",
            "vĩnh long", "đồng tháp", "tiền giang", "bến tre", "hậu giang",
        ],
    ),
    (
        "mien_trung",
        &[
            "đà nẵng", "huế", "quảng nam", "quảng ngãi", "bình định", "phú yên", "khánh hòa",
            "nha trang", "ninh thuận", "bình thuận", "quảng bình", "quảng trị", "hà tĩnh",
            "nghệ an", "thanh hóa", "kon tum", "gia lai", "đắk lắk", "đắk nông", "lâm đồng",
            "đà lạt",
        ],
    ),
    (
        "mien_bac",
        &[
            "hải phòng", "quảng ninh", "hải dương", "hưng yên", "thái bình", "nam định",
            "ninh bình", "bắc ninh", "bắc giang", "vĩnh phúc", "phú thọ", "thái nguyên",
            "lạng sơn", "cao bằng", "bắc kạn", "tuyên quang", "hà giang", "lào cai", "yên bái",
            "điện biên", "lai châu", "sơn la", "hòa bình",
        ],
    ),
];

/// Region key for an address, `default` when nothing matches
pub fn detect_region(address: &str) -> &'static str {
    let address = fold_diacritics(address);

    REGION_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|keyword| address.contains(&fold_diacritics(keyword)))
        })
        .map(|(region, _)| *region)
        .unwrap_or(DEFAULT_RATE.region)
}

pub fn rate_for(region: &str) -> ShippingRate {
    SHIPPING_RATES
        .iter()
        .copied()
        .find(|r| r.region == region)
        .unwrap_or(DEFAULT_RATE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingQuote {
    pub fee: i64,
    pub region: &'static str,
    pub free_shipping_threshold: i64,
    pub is_free_shipping: bool,
}

pub fn calculate_shipping(address: &str, subtotal: i64) -> ShippingQuote {
    let rate = rate_for(detect_region(address));
    let is_free_shipping = subtotal >= rate.free_shipping_threshold;

    ShippingQuote {
        fee: if is_free_shipping { 0 } else { rate.base_fee },
        region: rate.region,
        free_shipping_threshold: rate.free_shipping_threshold,
        is_free_shipping,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_region_ignores_accents() {
        assert_eq!(detect_region("12 Nguyễn Huệ, Quận 1, TP. Hồ Chí Minh"), "hcm");
        assert_eq!(detect_region("45 Cau Giay, Ha Noi"), "hanoi");
        assert_eq!(detect_region("Phường 3, Đà Lạt, Lâm Đồng"), "mien_trung");
        assert_eq!(detect_region("Lê Chân, Hải Phòng"), "mien_bac");
        assert_eq!(detect_region("Ninh Kiều, Cần Thơ"), "mien_nam");
        assert_eq!(detect_region("Somewhere else"), "default");
    }

    #[test]
    fn test_free_shipping_threshold() {
        let quote = calculate_shipping("Hà Nội", 499_999);
        assert_eq!(quote.fee, 20_000);
        assert!(!quote.is_free_shipping);

        let quote = calculate_shipping("Hà Nội", 500_000);
        assert_eq!(quote.fee, 0);
        assert!(quote.is_free_shipping);
    }

    #[test]
    fn test_hcm_always_free() {
        let quote = calculate_shipping("Thủ Đức", 0);
        assert_eq!(quote.fee, 0);
        assert_eq!(quote.region, "hcm");
    }

    #[test]
    fn test_default_rate() {
        let quote = calculate_shipping("Unknown town", 100_000);
        assert_eq!(quote.fee, 40_000);
        assert_eq!(quote.free_shipping_threshold, 1_000_000);
    }
}
