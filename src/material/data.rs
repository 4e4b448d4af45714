//! Builtin mass attenuation coefficients (total, with coherent scattering),
//! µ/ρ in cm²/g, from the NIST XCOM / Hubbell–Seltzer tables.
//!
//! Absorption edges within the range appear as repeated energies: below-edge
//! value first.

type Points = &'static [(f64, f64)];

/// (name, density in g/cm³, (keV, cm²/g) points)
pub(super) const BUILTIN: &[(&str, f64, Points)] = &[
    ("water"   ,  1.00 , WATER),
    ("pmma"    ,  1.19 , PMMA),
    ("bone"    ,  1.92 , BONE_CORTICAL),
    ("aluminum",  2.699, ALUMINUM),
    ("copper"  ,  8.96 , COPPER),
    ("tungsten", 19.3  , TUNGSTEN),
    ("csi"     ,  4.51 , CESIUM_IODIDE),
];

const WATER: Points = &[
    (  8.0, 10.37  ),
    ( 10.0,  5.329 ),
    ( 15.0,  1.673 ),
    ( 20.0,  0.8096),
    ( 30.0,  0.3756),
    ( 40.0,  0.2683),
    ( 50.0,  0.2269),
    ( 60.0,  0.2059),
    ( 80.0,  0.1837),
    (100.0,  0.1707),
    (150.0,  0.1505),
    (200.0,  0.1370),
];

const PMMA: Points = &[
    (  8.0,  6.495 ),
    ( 10.0,  3.356 ),
    ( 15.0,  1.101 ),
    ( 20.0,  0.5794),
    ( 30.0,  0.3060),
    ( 40.0,  0.2365),
    ( 50.0,  0.2077),
    ( 60.0,  0.1920),
    ( 80.0,  0.1742),
    (100.0,  0.1630),
    (150.0,  0.1440),
    (200.0,  0.1312),
];

const BONE_CORTICAL: Points = &[
    (  8.0, 53.4   ),
    ( 10.0, 28.51  ),
    ( 15.0,  9.032 ),
    ( 20.0,  4.001 ),
    ( 30.0,  1.331 ),
    ( 40.0,  0.6655),
    ( 50.0,  0.4242),
    ( 60.0,  0.3148),
    ( 80.0,  0.2229),
    (100.0,  0.1855),
    (150.0,  0.1480),
    (200.0,  0.1309),
];

const ALUMINUM: Points = &[
    (  8.0, 50.33  ),
    ( 10.0, 26.23  ),
    ( 15.0,  7.955 ),
    ( 20.0,  3.441 ),
    ( 30.0,  1.128 ),
    ( 40.0,  0.5685),
    ( 50.0,  0.3681),
    ( 60.0,  0.2778),
    ( 80.0,  0.2018),
    (100.0,  0.1704),
    (150.0,  0.1378),
    (200.0,  0.1223),
];

const COPPER: Points = &[
    (  8.0  ,  52.55  ),
    (  8.979,  38.29  ), // K
    (  8.979, 278.4   ),
    ( 10.0  , 215.9   ),
    ( 15.0  ,  74.05  ),
    ( 20.0  ,  33.79  ),
    ( 30.0  ,  10.92  ),
    ( 40.0  ,   4.862 ),
    ( 50.0  ,   2.613 ),
    ( 60.0  ,   1.593 ),
    ( 80.0  ,   0.7630),
    (100.0  ,   0.4584),
    (150.0  ,   0.2217),
    (200.0  ,   0.1559),
];

const TUNGSTEN: Points = &[
    (  8.0   , 176.2  ),
    ( 10.0   ,  96.91 ),
    ( 10.207 ,  89.32 ), // L3
    ( 10.207 , 233.4  ),
    ( 11.544 , 168.6  ), // L2
    ( 11.544 , 231.6  ),
    ( 12.100 , 201.2  ), // L1
    ( 12.100 , 233.1  ),
    ( 15.0   , 138.9  ),
    ( 20.0   ,  65.73 ),
    ( 30.0   ,  22.73 ),
    ( 40.0   ,  10.67 ),
    ( 50.0   ,   5.949),
    ( 60.0   ,   3.713),
    ( 69.525 ,   2.552), // K
    ( 69.525 ,  11.23 ),
    ( 80.0   ,   7.810),
    (100.0   ,   4.438),
    (150.0   ,   1.581),
    (200.0   ,   0.7844),
];

const CESIUM_IODIDE: Points = &[
    (  8.0   , 312.0  ),
    ( 10.0   , 171.0  ),
    ( 15.0   ,  57.1  ),
    ( 20.0   ,  26.3  ),
    ( 30.0   ,   8.8  ),
    ( 33.169 ,   6.6  ), // I K
    ( 33.169 ,  21.2  ),
    ( 35.985 ,  17.0  ), // Cs K
    ( 35.985 ,  30.1  ),
    ( 40.0   ,  22.7  ),
    ( 50.0   ,  12.7  ),
    ( 60.0   ,   7.86 ),
    ( 80.0   ,   3.62 ),
    (100.0   ,   2.01 ),
    (150.0   ,   0.74 ),
    (200.0   ,   0.39 ),
];
