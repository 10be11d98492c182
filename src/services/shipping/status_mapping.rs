//! Yalidine parcel status labels mapped onto order statuses.

use crate::entities::order::OrderStatus;

/// Lower-case, accent-free, single-spaced form of a carrier label
pub fn normalize_label(label: &str) -> String {
    let folded: String = label
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'â' | 'ä' | 'á' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' => 'i',
            'ô' | 'ö' | 'ó' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ç' => 'c',
            '\'' | '’' | '-' | '_' => ' ',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Order status for a carrier label; `None` for labels we do not track
pub fn map_carrier_status(label: &str) -> Option<OrderStatus> {
    let status = match normalize_label(label).as_str() {
        "en preparation" | "pas encore expedie" | "a verifier" | "pret a expedier"
        | "pas encore ramasse" => OrderStatus::Confirmed,

        "ramasse" | "expedie" | "centre" | "vers wilaya" | "recu a wilaya" | "transfert"
        | "sorti en livraison" | "en attente du client" | "en attente" | "en alerte"
        | "tentative echouee" => OrderStatus::Shipped,

        "livre" => OrderStatus::Delivered,

        "echec livraison" | "retour vers centre" | "retourne au centre" | "retour transfert"
        | "retour groupe" | "retour a retirer" | "retour vers vendeur"
        | "retourne au vendeur" | "echange echoue" => OrderStatus::Returned,

        _ => return None,
    };
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("En préparation", Some(OrderStatus::Confirmed))]
    #[case("Prêt à expédier", Some(OrderStatus::Confirmed))]
    #[case("Expédié", Some(OrderStatus::Shipped))]
    #[case("Centre", Some(OrderStatus::Shipped))]
    #[case("Vers Wilaya", Some(OrderStatus::Shipped))]
    #[case("Reçu à Wilaya", Some(OrderStatus::Shipped))]
    #[case("Sorti en livraison", Some(OrderStatus::Shipped))]
    #[case("Tentative échouée", Some(OrderStatus::Shipped))]
    #[case("Livré", Some(OrderStatus::Delivered))]
    #[case("Echèc livraison", Some(OrderStatus::Returned))]
    #[case("Retourné au vendeur", Some(OrderStatus::Returned))]
    #[case("Retour à retirer", Some(OrderStatus::Returned))]
    #[case("Echange échoué", Some(OrderStatus::Returned))]
    #[case("Something else", None)]
    #[case("", None)]
    fn maps_known_labels(#[case] label: &str, #[case] expected: Option<OrderStatus>) {
        assert_eq!(map_carrier_status(label), expected);
    }

    #[rstest]
    #[case("LIVRÉ")]
    #[case("livre")]
    #[case("  Livré  ")]
    fn matching_ignores_case_accents_and_padding(#[case] label: &str) {
        assert_eq!(map_carrier_status(label), Some(OrderStatus::Delivered));
    }

    #[test]
    fn normalization_collapses_spacing() {
        assert_eq!(normalize_label("Reçu   à  WILAYA"), "recu a wilaya");
        assert_eq!(normalize_label("Retourné-au-centre"), "retourne au centre");
    }
}
