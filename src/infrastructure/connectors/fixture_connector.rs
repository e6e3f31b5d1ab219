use async_trait::async_trait;

use crate::domain::entities::RawFacilityRow;
use crate::infrastructure::connectors::FacilitySource;

/// A representative slice of the Ghanaian facility/NGO catalog, hardcoded in
/// the same style as the starting point's connectors (`CpraConnector`,
/// `LaCountyConnector`, …). Used as the default data source when no CSV
/// path is configured, so the engine is exercisable out of the box.
pub struct FixtureFacilitySource;

macro_rules! row {
    ($id:expr, $name:expr, $type:expr, $city:expr, $region:expr, $lat:expr, $lng:expr, $beds:expr, $doctors:expr, [$($spec:expr),* $(,)?], [$($proc:expr),* $(,)?], [$($equip:expr),* $(,)?], [$($cap:expr),* $(,)?]) => {
        RawFacilityRow {
            pk_unique_id: $id.to_owned(),
            unique_id: $id.to_owned(),
            name: $name.to_owned(),
            organization_type: Some("facility".to_owned()),
            facility_type: Some($type.to_owned()),
            city: Some($city.to_owned()),
            region: Some($region.to_owned()),
            latitude: Some($lat),
            longitude: Some($lng),
            beds: Some($beds),
            doctors: Some($doctors),
            year_established: None,
            area: None,
            specialties: vec![$($spec.to_owned()),*],
            procedures: vec![$($proc.to_owned()),*],
            equipment: vec![$($equip.to_owned()),*],
            capabilities: vec![$($cap.to_owned()),*],
            source_url: None,
        }
    };
}

#[async_trait]
impl FacilitySource for FixtureFacilitySource {
    fn source_name(&self) -> &'static str {
        "ghana_catalog_fixture"
    }

    async fn fetch_facilities(&self) -> anyhow::Result<Vec<RawFacilityRow>> {
        Ok(vec![
            row!("gh-001", "Korle Bu Teaching Hospital", "hospital", "Accra", "Greater Accra", 5.5365, -0.2269, 2000.0, 450.0,
                ["cardiology", "neurosurgery", "oncology", "ophthalmology"],
                ["bypass surgery", "chemotherapy", "cataract surgery"],
                ["mri scanner", "ct scanner", "linear accelerator"],
                ["icu", "operating theatre"]),
            row!("gh-002", "37 Military Hospital", "hospital", "Accra", "Greater Accra", 5.5850, -0.1870, 600.0, 120.0,
                ["cardiology", "orthopedics"],
                ["angioplasty"],
                ["ct scanner"],
                ["icu", "operating theatre"]),
            row!("gh-003", "Ridge Hospital", "hospital", "Accra", "Greater Accra", 5.5690, -0.1960, 420.0, 90.0,
                ["obstetrics", "gynecology", "pediatrics"],
                ["c-section"],
                ["ultrasound"],
                ["operating theatre"]),
            row!("gh-004", "Achimota Hospital", "hospital", "Accra", "Greater Accra", 5.6180, -0.2260, 180.0, 35.0,
                ["internal medicine", "pediatrics"],
                [],
                [],
                []),
            row!("gh-005", "Tema General Hospital", "hospital", "Tema", "Greater Accra", 5.6698, -0.0166, 200.0, 40.0,
                ["emergency medicine", "orthopedics"],
                [],
                ["x-ray machine"],
                ["emergency room"]),
            row!("gh-006", "Mamprobi Polyclinic", "clinic", "Accra", "Greater Accra", 5.5390, -0.2350, 40.0, 6.0,
                ["internal medicine"],
                [],
                [],
                []),
            row!("gh-007", "Kumasi South Hospital", "hospital", "Kumasi", "Ashanti", 6.6700, -1.6400, 350.0, 60.0,
                ["cardiology", "nephrology"],
                ["dialysis"],
                ["dialysis machine"],
                ["icu"]),
            row!("gh-008", "Komfo Anokye Teaching Hospital", "hospital", "Kumasi", "Ashanti", 6.6984, -1.6244, 1200.0, 220.0,
                ["neurosurgery", "oncology", "cardiology", "urology"],
                ["chemotherapy", "biopsy"],
                ["ct scanner", "mri scanner"],
                ["icu", "operating theatre"]),
            row!("gh-009", "Suntreso Government Hospital", "hospital", "Kumasi", "Ashanti", 6.7100, -1.6500, 150.0, 25.0,
                ["pediatrics", "obstetrics"],
                [],
                ["ultrasound"],
                []),
            row!("gh-010", "Obuasi Government Hospital", "hospital", "Obuasi", "Ashanti", 6.2060, -1.6630, 110.0, 18.0,
                ["general surgery"],
                [],
                [],
                []),
            row!("gh-011", "Effia Nkwanta Regional Hospital", "hospital", "Sekondi", "Western", 4.9340, -1.7130, 280.0, 48.0,
                ["cardiology", "pediatrics"],
                [],
                ["ecg machine"],
                ["icu"]),
            row!("gh-012", "Takoradi Hospital", "hospital", "Takoradi", "Western", 4.8981, -1.7450, 90.0, 15.0,
                ["internal medicine"],
                [],
                [],
                []),
            row!("gh-013", "Tarkwa Municipal Hospital", "hospital", "Tarkwa", "Western", 5.3009, -1.9940, 60.0, 9.0,
                ["general surgery"],
                [],
                [],
                []),
            row!("gh-014", "Cape Coast Teaching Hospital", "hospital", "Cape Coast", "Central", 5.1036, -1.2466, 400.0, 70.0,
                ["obstetrics", "gynecology", "ophthalmology"],
                ["cataract surgery"],
                [],
                ["operating theatre"]),
            row!("gh-015", "Winneba Government Hospital", "hospital", "Winneba", "Central", 5.3508, -0.6257, 70.0, 10.0,
                ["internal medicine"],
                [],
                [],
                []),
            row!("gh-016", "Koforidua Regional Hospital", "hospital", "Koforidua", "Eastern", 6.0936, -0.2572, 230.0, 38.0,
                ["cardiology", "orthopedics"],
                [],
                ["x-ray machine"],
                ["icu"]),
            row!("gh-017", "Nkawkaw Government Hospital", "hospital", "Nkawkaw", "Eastern", 6.5500, -0.7800, 80.0, 12.0,
                ["general surgery"],
                [],
                [],
                []),
            row!("gh-018", "Ho Teaching Hospital", "hospital", "Ho", "Volta", 6.6000, 0.4680, 310.0, 55.0,
                ["cardiology", "pediatrics", "oncology"],
                ["chemotherapy"],
                ["ct scanner"],
                ["icu", "operating theatre"]),
            row!("gh-019", "Hohoe Municipal Hospital", "hospital", "Hohoe", "Volta", 7.1500, 0.4730, 65.0, 8.0,
                ["internal medicine"],
                [],
                [],
                []),
            row!("gh-020", "Sunyani Regional Hospital", "hospital", "Sunyani", "Bono", 7.3349, -2.3286, 220.0, 34.0,
                ["cardiology", "nephrology"],
                ["dialysis"],
                ["dialysis machine"],
                ["icu"]),
            row!("gh-021", "Techiman Holy Family Hospital", "hospital", "Techiman", "Bono East", 7.5833, -1.9308, 140.0, 20.0,
                ["obstetrics", "pediatrics"],
                [],
                ["ultrasound"],
                []),
            row!("gh-022", "Tamale Teaching Hospital", "hospital", "Tamale", "Northern", 9.4034, -0.8393, 500.0, 85.0,
                ["cardiology", "ophthalmology", "orthopedics"],
                ["cataract surgery"],
                ["ct scanner"],
                ["icu", "operating theatre"]),
            row!("gh-023", "Yendi Municipal Hospital", "hospital", "Yendi", "Northern", 9.4450, -0.0100, 55.0, 7.0,
                ["internal medicine"],
                [],
                [],
                []),
            row!("gh-024", "Bolgatanga Regional Hospital", "hospital", "Bolgatanga", "Upper East", 10.7863, -0.8522, 190.0, 28.0,
                ["general surgery", "pediatrics"],
                [],
                [],
                ["icu"]),
            row!("gh-025", "Bawku Presbyterian Hospital", "hospital", "Bawku", "Upper East", 11.0600, -0.2400, 100.0, 14.0,
                ["obstetrics"],
                [],
                [],
                []),
            row!("gh-026", "Wa Regional Hospital", "hospital", "Wa", "Upper West", 10.0601, -2.5099, 160.0, 22.0,
                ["general surgery", "internal medicine"],
                [],
                [],
                ["icu"]),
            row!("gh-027", "Accra Eye Clinic", "clinic", "Accra", "Greater Accra", 5.6140, -0.1870, 20.0, 4.0,
                ["ophthalmology"],
                ["cataract surgery"],
                [],
                []),
            row!("gh-028", "Kumasi Dental Centre", "dentist", "Kumasi", "Ashanti", 6.6900, -1.6200, 8.0, 3.0,
                ["dentistry"],
                [],
                [],
                []),
            row!("gh-029", "LightHouse Pharmacy", "pharmacy", "Accra", "Greater Accra", 5.5600, -0.2050, 0.0, 0.0,
                [],
                [],
                [],
                []),
            RawFacilityRow {
                organization_type: Some("ngo".to_owned()),
                ..row!("gh-030", "Ghana Health Outreach NGO Clinic", "clinic", "Accra", "Greater Accra", 5.6000, -0.1900, 12.0, 2.0,
                    ["psychiatry"],
                    [],
                    [],
                    [])
            },
        ])
    }
}
