//! XML dump fixtures shared by the end-to-end tests.

pub const FEB_2024: &str = "2024-02-01";
pub const MAR_2024: &str = "2024-03-01";

pub const ARTIST_1_ID: i64 = 1;
pub const ARTIST_1_NAME: &str = "The Persuader";
pub const ARTIST_2_ID: i64 = 2;
pub const ARTIST_2_NAME: &str = "Mr. James Barth & A.D.";
pub const BLANK_PROFILE_ARTIST_ID: i64 = 42;

pub const ARTISTS_XML: &str = r#"<artists>
<artist>
    <id>1</id>
    <name>The Persuader</name>
    <realname>Jesper Dahlbäck</realname>
    <profile>Swedish techno producer.</profile>
    <data_quality>Needs Vote</data_quality>
    <urls><url>https://en.wikipedia.org/wiki/Jesper_Dahlb%C3%A4ck</url></urls>
    <namevariations><name>Persuader</name><name>The Presuader</name></namevariations>
    <aliases><name id="239">Jesper Dahlbäck</name></aliases>
</artist>
<artist>
    <id>2</id>
    <name>Mr. James Barth &amp; A.D.</name>
    <realname>Cari Lekebusch &amp; Alexi Delano</realname>
    <profile/>
    <members><name id="26">Alexi Delano</name><name id="27">Cari Lekebusch</name></members>
</artist>
<artist>
    <id>42</id>
    <name>Blank Profile</name>
    <profile>   </profile>
</artist>
</artists>"#;

pub const LABELS_XML: &str = r#"<labels>
<label>
    <id>1</id>
    <name>Planet E</name>
    <contactinfo>Planet E Communications</contactinfo>
    <profile>Detroit label.</profile>
    <urls><url>http://planet-e.net</url></urls>
    <sublabels><label id="86537">Antidote (4)</label></sublabels>
</label>
<label>
    <id>5</id>
    <name>Svek</name>
</label>
</labels>"#;

pub const MASTER_COUNT: u64 = 5;

pub const MASTERS_XML: &str = r#"<masters>
<master id="10"><main_release>1</main_release><year>1999</year><title>Stockholm</title>
    <artists><artist><id>1</id><name>The Persuader</name></artist></artists>
    <genres><genre>Electronic</genre></genres><styles><style>Deep House</style></styles>
</master>
<master id="11"><year>2000</year><title>Second</title></master>
<master id="12"><year>2001</year><title>Third</title></master>
<master id="13"><year>2002</year><title>Fourth</title></master>
<master id="14"><year>2003</year><title>Fifth</title></master>
</masters>"#;

pub const RELEASES_XML: &str = r#"<releases>
<release id="1" status="Accepted">
    <artists><artist><id>1</id><name>The Persuader</name></artist></artists>
    <title>Stockholm</title>
    <labels><label name="Svek" catno="SK032" id="5"/></labels>
    <formats><format name="Vinyl" qty="2"><descriptions><description>12"</description></descriptions></format></formats>
    <genres><genre>Electronic</genre></genres>
    <country>Sweden</country>
    <released>1999-03-00</released>
    <master_id is_main_release="true">10</master_id>
    <tracklist>
        <track><position>A</position><title>Östermalm</title><duration>4:45</duration></track>
        <track><position>B1</position><title>Vasastaden</title><duration>6:11</duration></track>
    </tracklist>
</release>
</releases>"#;

/// Same artists with a changed profile for artist 1 and no profile text for artist 2.
pub const ARTISTS_UPDATED_XML: &str = r#"<artists>
<artist>
    <id>1</id>
    <name>The Persuader</name>
    <profile>Swedish techno producer, also known as Jesper Dahlbäck.</profile>
</artist>
<artist>
    <id>2</id>
    <name>Mr. James Barth &amp; A.D.</name>
</artist>
</artists>"#;

/// Release 1 again, down to its first track and filed under Rock.
pub const RELEASES_REVISED_XML: &str = r#"<releases>
<release id="1" status="Accepted">
    <artists><artist><id>1</id><name>The Persuader</name></artist></artists>
    <title>Stockholm</title>
    <labels><label name="Svek" catno="SK032" id="5"/></labels>
    <formats><format name="Vinyl" qty="2"><descriptions><description>12"</description></descriptions></format></formats>
    <genres><genre>Rock</genre></genres>
    <country>Sweden</country>
    <released>1999-03-00</released>
    <master_id is_main_release="true">10</master_id>
    <tracklist>
        <track><position>A</position><title>Östermalm</title><duration>4:45</duration></track>
    </tracklist>
</release>
</releases>"#;
